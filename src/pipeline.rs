//! Stage composition for multi-stage components.
//!
//! A component made of internal stages implements [`Ticker`] by ticking each
//! stage against shared component state and OR-ing the results. Stages are
//! ticked in *reverse* pipeline order (the stage closest to the output
//! first), so a stage drains its downstream buffer before its upstream
//! neighbour can refill it within the same cycle.
//!
//! [`Ticker`]: crate::component::Ticker

use std::collections::VecDeque;

use crate::types::SimTime;

/// One stage of a component pipeline.
///
/// `C` is the component state shared by all stages.
pub trait Stage<C> {
    /// Advances the stage by one issue slot.
    ///
    /// Returns true if the stage made progress.
    fn tick(&mut self, ctx: &mut C, now: SimTime) -> bool;
}

/// Ticks `stage` `times` times, returning whether any tick made progress.
///
/// Every tick runs even after one made progress.
pub fn tick_repeated<C, S>(stage: &mut S, ctx: &mut C, now: SimTime, times: usize) -> bool
where
    S: Stage<C> + ?Sized,
{
    let mut progress = false;
    for _ in 0..times {
        progress |= stage.tick(ctx, now);
    }
    progress
}

/// Ticks every stage of a slice once, in slice order.
pub fn tick_each<C, S>(stages: &mut [S], ctx: &mut C, now: SimTime) -> bool
where
    S: Stage<C>,
{
    let mut progress = false;
    for stage in stages.iter_mut() {
        progress |= stage.tick(ctx, now);
    }
    progress
}

/// A bounded FIFO between two stages.
///
/// Producers must check [`Buffer::can_push`] first; a full buffer is the
/// stage-level backpressure signal.
#[derive(Debug, Clone)]
pub struct Buffer<T> {
    name: String,
    capacity: usize,
    items: VecDeque<T>,
    peak: usize,
}

impl<T> Buffer<T> {
    /// Creates an empty buffer.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: VecDeque::with_capacity(capacity),
            peak: 0,
        }
    }

    /// Returns true if one more item fits.
    pub fn can_push(&self) -> bool {
        self.items.len() < self.capacity
    }

    /// Appends an item.
    ///
    /// # Panics
    /// Panics if the buffer is full.
    pub fn push(&mut self, item: T) {
        assert!(self.can_push(), "buffer {} overflow", self.name);
        self.items.push_back(item);
        self.peak = self.peak.max(self.items.len());
    }

    /// Removes the oldest item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Returns the oldest item.
    pub fn peek(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest occupancy seen so far.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Iterates the buffered items, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Drops all items.
    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two-stage toy pipeline: `Source` feeds `mid`, `Sink` drains it.
    struct Line {
        input: u32,
        mid: Buffer<u32>,
        output: Vec<(u32, SimTime)>,
        trace: Vec<&'static str>,
    }

    struct Source;
    struct Sink;

    impl Stage<Line> for Source {
        fn tick(&mut self, line: &mut Line, _now: SimTime) -> bool {
            line.trace.push("source");
            if line.input == 0 || !line.mid.can_push() {
                return false;
            }
            line.mid.push(line.input);
            line.input -= 1;
            true
        }
    }

    impl Stage<Line> for Sink {
        fn tick(&mut self, line: &mut Line, now: SimTime) -> bool {
            line.trace.push("sink");
            match line.mid.pop() {
                Some(item) => {
                    line.output.push((item, now));
                    true
                }
                None => false,
            }
        }
    }

    fn line(items: u32) -> Line {
        Line {
            input: items,
            mid: Buffer::new("mid", 1),
            output: Vec::new(),
            trace: Vec::new(),
        }
    }

    fn cycle(line: &mut Line, now: SimTime) -> bool {
        let mut progress = false;
        progress |= Sink.tick(line, now);
        progress |= Source.tick(line, now);
        progress
    }

    #[test]
    fn test_reverse_order_keeps_single_slot_flowing() {
        let mut l = line(3);
        let mut now = 0;
        while cycle(&mut l, now) {
            now += 1;
        }

        // Draining first lets the one-slot buffer carry an item every cycle.
        assert_eq!(l.output, vec![(3, 1), (2, 2), (1, 3)]);
    }

    #[test]
    fn test_tick_repeated_never_short_circuits() {
        let mut l = line(1);
        let progress = tick_repeated(&mut Source, &mut l, 0, 3);

        assert!(progress);
        assert_eq!(l.trace, vec!["source", "source", "source"]);
    }

    #[test]
    fn test_no_progress_when_all_stages_idle() {
        let mut l = line(0);
        assert!(!cycle(&mut l, 0));
        assert!(!tick_each(&mut [Sink, Sink], &mut l, 0));
    }

    #[test]
    fn test_buffer_bounds() {
        let mut buf = Buffer::new("b", 2);
        buf.push(1);
        buf.push(2);
        assert!(!buf.can_push());
        assert_eq!(buf.peek(), Some(&1));
        assert_eq!(buf.pop(), Some(1));
        assert_eq!(buf.len(), 1);
        assert_eq!(buf.peak(), 2);
    }

    #[test]
    #[should_panic(expected = "buffer b overflow")]
    fn test_buffer_overflow_panics() {
        let mut buf = Buffer::new("b", 1);
        buf.push(1);
        buf.push(2);
    }
}
