//! Lock-free single-producer/single-consumer event channel.
//!
//! Carries discrete control messages from the control thread to the audio
//! thread through a fixed-capacity ring. `push` never blocks and never grows:
//! when the ring is full the event is discarded and a relaxed counter records
//! the drop.
//!
//! Memory ordering:
//!
//! - `head` is written only by the producer. It is published with `Release`
//!   after the slot words are written, and the consumer reads it with
//!   `Acquire`, so a consumer that sees the new head sees the complete slot.
//! - `tail` is written only by the consumer, published with `Release` after
//!   the slot has been read. The producer reads it with `Acquire` before
//!   reusing a slot.
//! - The dropped counter is `Relaxed`; it is a diagnostic, not a fence.
//!
//! Slots are three `AtomicU64` words so no `unsafe` is needed. Both endpoints
//! are unique, non-`Clone` handles, which keeps the single-producer and
//! single-consumer invariants in the type system.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Default ring capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Discrete message kinds understood by audio operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventKind {
    /// Start a note. `value` = note number, `value2` = velocity.
    NoteOn = 0,
    /// Release a note. `value` = note number.
    NoteOff = 1,
    /// One-shot trigger. `value` = strength.
    Trigger = 2,
    /// Set parameter `param` to `value`.
    ParamSet = 3,
    /// Return the operator to its initial state.
    Reset = 4,
}

impl EventKind {
    fn from_raw(raw: u64) -> Self {
        match raw {
            0 => Self::NoteOn,
            1 => Self::NoteOff,
            2 => Self::Trigger,
            3 => Self::ParamSet,
            _ => Self::Reset,
        }
    }
}

/// A control message. Plain data, copied by value into the ring.
///
/// `target` is the audio operator's position in the current generation's
/// audio execution order (see [`Graph::audio_target`](crate::Graph::audio_target)).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Message kind.
    pub kind: EventKind,
    /// Target audio operator.
    pub target: u32,
    /// Parameter index for [`EventKind::ParamSet`].
    pub param: u32,
    /// Primary payload.
    pub value: f32,
    /// Secondary payload.
    pub value2: f32,
}

impl Event {
    /// Note-on for `target`.
    pub fn note_on(target: u32, note: f32, velocity: f32) -> Self {
        Self::with(EventKind::NoteOn, target, 0, note, velocity)
    }

    /// Note-off for `target`.
    pub fn note_off(target: u32, note: f32) -> Self {
        Self::with(EventKind::NoteOff, target, 0, note, 0.0)
    }

    /// Trigger `target` with `strength`.
    pub fn trigger(target: u32, strength: f32) -> Self {
        Self::with(EventKind::Trigger, target, 0, strength, 0.0)
    }

    /// Set parameter `param` of `target`.
    pub fn param_set(target: u32, param: u32, value: f32) -> Self {
        Self::with(EventKind::ParamSet, target, param, value, 0.0)
    }

    /// Reset `target`.
    pub fn reset(target: u32) -> Self {
        Self::with(EventKind::Reset, target, 0, 0.0, 0.0)
    }

    fn with(kind: EventKind, target: u32, param: u32, value: f32, value2: f32) -> Self {
        Self {
            kind,
            target,
            param,
            value,
            value2,
        }
    }

    fn pack(&self) -> [u64; 3] {
        [
            u64::from(self.target) | (u64::from(self.param) << 32),
            u64::from(self.value.to_bits()) | (u64::from(self.value2.to_bits()) << 32),
            self.kind as u64,
        ]
    }

    fn unpack(words: [u64; 3]) -> Self {
        Self {
            kind: EventKind::from_raw(words[2]),
            target: words[0] as u32,
            param: (words[0] >> 32) as u32,
            value: f32::from_bits(words[1] as u32),
            value2: f32::from_bits((words[1] >> 32) as u32),
        }
    }
}

struct Slot {
    words: [AtomicU64; 3],
}

impl Slot {
    fn new() -> Self {
        Self {
            words: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        }
    }
}

struct Ring {
    slots: Box<[Slot]>,
    /// Next write position. Monotonic; wraps on overflow.
    head: AtomicUsize,
    /// Next read position. Monotonic; wraps on overflow.
    tail: AtomicUsize,
    dropped: AtomicU64,
}

impl Ring {
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail).min(self.capacity())
    }
}

/// Create a channel holding exactly `capacity` events (minimum 1).
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    let capacity = capacity.max(1);
    let ring = Arc::new(Ring {
        slots: (0..capacity).map(|_| Slot::new()).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
        dropped: AtomicU64::new(0),
    });
    (
        EventSender {
            ring: Arc::clone(&ring),
        },
        EventReceiver { ring },
    )
}

/// Producer endpoint, owned by the control thread.
pub struct EventSender {
    ring: Arc<Ring>,
}

impl EventSender {
    /// Enqueue `event`. Returns `false` and counts a drop if the ring is full.
    pub fn push(&mut self, event: Event) -> bool {
        let ring = &*self.ring;
        let head = ring.head.load(Ordering::Relaxed);
        let tail = ring.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= ring.capacity() {
            ring.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let slot = &ring.slots[head % ring.capacity()];
        for (word, value) in slot.words.iter().zip(event.pack()) {
            word.store(value, Ordering::Relaxed);
        }
        ring.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Events dropped since creation or the last reset.
    pub fn dropped_count(&self) -> u64 {
        self.ring.dropped.load(Ordering::Relaxed)
    }

    /// Zero the dropped-event counter.
    pub fn reset_dropped_count(&self) {
        self.ring.dropped.store(0, Ordering::Relaxed);
    }

    /// Events waiting to be consumed.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fraction of the ring in use, `0.0..=1.0`.
    pub fn fill_level(&self) -> f32 {
        self.ring.len() as f32 / self.ring.capacity() as f32
    }

    /// Slot count.
    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }
}

/// Consumer endpoint, owned by the audio thread.
pub struct EventReceiver {
    ring: Arc<Ring>,
}

impl EventReceiver {
    /// Oldest unconsumed event, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<Event> {
        let ring = &*self.ring;
        let tail = ring.tail.load(Ordering::Relaxed);
        let head = ring.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }

        let slot = &ring.slots[tail % ring.capacity()];
        let words = [
            slot.words[0].load(Ordering::Relaxed),
            slot.words[1].load(Ordering::Relaxed),
            slot.words[2].load(Ordering::Relaxed),
        ];
        ring.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(Event::unpack(words))
    }

    /// Discard every pending event, returning how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut n = 0;
        while self.pop().is_some() {
            n += 1;
        }
        n
    }

    /// Events waiting to be consumed.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
