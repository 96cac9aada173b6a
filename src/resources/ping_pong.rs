// SPDX-License-Identifier: GPL-3.0-only

//! Two slots with swappable "source" and "destination" roles.
//!
//! The slots never move; only the index of the slot currently playing the
//! source role changes. A chain stage reads [`PingPong::source`], writes
//! [`PingPong::destination`], then calls [`PingPong::swap`], so after any
//! number of stages the most recently written slot is the source.

/// Which physical slot holds a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }

    fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

#[derive(Debug)]
pub struct PingPong<T> {
    slots: [T; 2],
    source: Slot,
}

impl<T> PingPong<T> {
    /// `a` starts as the source, `b` as the destination
    pub fn new(a: T, b: T) -> Self {
        Self {
            slots: [a, b],
            source: Slot::A,
        }
    }

    pub fn source(&self) -> &T {
        &self.slots[self.source.index()]
    }

    pub fn destination(&self) -> &T {
        &self.slots[self.source.other().index()]
    }

    /// Both roles at once, for a stage that reads one and writes the other
    pub fn roles(&self) -> (&T, &T) {
        (self.source(), self.destination())
    }

    /// Slot currently holding the source role
    pub fn source_slot(&self) -> Slot {
        self.source
    }

    /// Exchange roles. The slots themselves stay where they are.
    pub fn swap(&mut self) {
        self.source = self.source.other();
    }

    /// Put slot A back in the source role
    pub fn reset(&mut self) {
        self.source = Slot::A;
    }

    pub fn slot(&self, slot: Slot) -> &T {
        &self.slots[slot.index()]
    }
}

/// Run `stages` in order over a ping-pong pair.
///
/// `dispatch` receives each stage with the current source and destination.
/// Roles swap after every stage, so on return `slots.source()` holds the
/// output of the last stage, or the seeded input when there were no stages.
/// Returns the number of stages run.
pub fn run_stages<T, S, E>(
    slots: &mut PingPong<T>,
    stages: impl IntoIterator<Item = S>,
    mut dispatch: impl FnMut(S, &T, &T) -> Result<(), E>,
) -> Result<usize, E> {
    let mut count = 0;
    for stage in stages {
        let (source, destination) = slots.roles();
        dispatch(stage, source, destination)?;
        slots.swap();
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_roles_swap_and_reset() {
        let mut pair = PingPong::new("a", "b");
        assert_eq!(pair.roles(), (&"a", &"b"));
        assert_eq!(pair.source_slot(), Slot::A);

        pair.swap();
        assert_eq!(pair.roles(), (&"b", &"a"));
        assert_eq!(pair.source_slot(), Slot::B);

        pair.swap();
        assert_eq!(pair.source(), &"a");

        pair.swap();
        pair.reset();
        assert_eq!(pair.source(), &"a");
        assert_eq!(pair.slot(Slot::B), &"b");
    }

    #[test]
    fn test_stage_never_reads_its_own_output() {
        let mut pair = PingPong::new(0usize, 1usize);
        run_stages(&mut pair, 0..7, |_, src, dst| {
            assert_ne!(src, dst);
            Ok::<_, ()>(())
        })
        .unwrap();
    }

    #[test]
    fn test_zero_stages_leaves_seed_as_source() {
        let mut pair = PingPong::new(RefCell::new(vec![9u8]), RefCell::new(vec![0u8]));
        let ran = run_stages(&mut pair, std::iter::empty::<()>(), |_, _, _| Ok::<_, ()>(())).unwrap();
        assert_eq!(ran, 0);
        assert_eq!(*pair.source().borrow(), vec![9u8]);
    }

    #[test]
    fn test_last_written_slot_is_source() {
        for stages in 1..6usize {
            let mut pair = PingPong::new(RefCell::new(0usize), RefCell::new(0usize));
            run_stages(&mut pair, 1..=stages, |stage, _, dst| {
                *dst.borrow_mut() = stage;
                Ok::<_, ()>(())
            })
            .unwrap();
            assert_eq!(*pair.source().borrow(), stages);
        }
    }

    #[test]
    fn test_error_stops_chain() {
        let mut pair = PingPong::new(0, 1);
        let mut seen = Vec::new();
        let result = run_stages(&mut pair, 0..5, |stage, _, _| {
            seen.push(stage);
            if stage == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
