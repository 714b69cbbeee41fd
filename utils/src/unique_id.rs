/// Monotonic id source. Every compilation owns its own instances, so two
/// compilations in one process produce the same names.
#[derive(Debug, Default)]
pub struct UniqueIds {
    next: u64,
}

impl UniqueIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }

    /// Name of an anonymous global holding a string literal.
    pub fn next_string_literal(&mut self) -> String {
        format!(".L..{}", self.next_id())
    }
}

/// Labels of one construct share an id, so `.L.else.3` pairs with `.L.end.3`.
pub fn label(action: &str, id: u64) -> String {
    format!(".L.{action}.{id}")
}
