// src/studio/slice.rs
use serde::Serialize;

/// Proof that a call was started against a given slice generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket(u64);

/// `{loading, error, data}` bucket owned by one orchestration operation.
///
/// Every `begin` or `reset` bumps the generation; a result is only applied
/// when its ticket matches the current generation, so a slow call that
/// resolves after a newer one started is dropped.
#[derive(Debug, Clone, Serialize)]
pub struct Slice<T> {
    pub data: T,
    pub loading: bool,
    pub error: Option<String>,
    #[serde(skip)]
    generation: u64,
}

impl<T> Slice<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            loading: false,
            error: None,
            generation: 0,
        }
    }

    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.loading = true;
        self.error = None;
        Ticket(self.generation)
    }

    /// Ticket for the current generation without starting a call.
    pub fn current(&self) -> Ticket {
        Ticket(self.generation)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation
    }

    /// Applies `update` to the data if the ticket is current.
    pub fn succeed_with(&mut self, ticket: Ticket, update: impl FnOnce(&mut T)) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        update(&mut self.data);
        self.loading = false;
        self.error = None;
        true
    }

    /// Records a failure, leaving the data untouched.
    pub fn fail(&mut self, ticket: Ticket, message: String) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.loading = false;
        self.error = Some(message);
        true
    }

    /// Clears the slice and invalidates any call in flight.
    pub fn reset(&mut self)
    where
        T: Default,
    {
        self.generation += 1;
        self.data = T::default();
        self.loading = false;
        self.error = None;
    }
}

impl<T: Default> Default for Slice<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_ticket_is_ignored() {
        let mut slice: Slice<Vec<&str>> = Slice::default();
        let first = slice.begin();
        let second = slice.begin();
        assert!(slice.succeed_with(second, |d| d.push("second")));
        assert!(!slice.succeed_with(first, |d| d.push("first")));
        assert!(!slice.fail(first, "late failure".to_string()));
        assert_eq!(slice.data, vec!["second"]);
        assert!(slice.error.is_none());
    }

    #[test]
    fn loading_follows_latest_call() {
        let mut slice: Slice<u32> = Slice::default();
        let first = slice.begin();
        let second = slice.begin();
        assert!(!slice.succeed_with(first, |d| *d = 1));
        assert!(slice.loading);
        assert!(slice.fail(second, "boom".to_string()));
        assert!(!slice.loading);
        assert_eq!(slice.error.as_deref(), Some("boom"));
        assert_eq!(slice.data, 0);
    }

    #[test]
    fn reset_invalidates_in_flight_calls() {
        let mut slice: Slice<Option<u32>> = Slice::default();
        let ticket = slice.begin();
        slice.reset();
        assert!(!slice.loading);
        assert!(!slice.succeed_with(ticket, |d| *d = Some(3)));
        assert_eq!(slice.data, None);
    }
}
