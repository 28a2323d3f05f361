use nfa_core::{SetDefinition, TableKey};

/// What an open block is.
#[derive(Debug, Clone)]
pub enum Scope {
    Table(TableKey),
    Chain { table: TableKey, name: String },
    Set { table: TableKey, set: SetDefinition },
    /// Block whose contents are skipped (`map`, `flowtable`, misplaced blocks)
    Ignored { kind: String, level: usize },
}

impl Scope {
    /// Nesting level: tables are 1, their children 2
    pub fn level(&self) -> usize {
        match self {
            Scope::Table(_) => 1,
            Scope::Chain { .. } | Scope::Set { .. } => 2,
            Scope::Ignored { level, .. } => *level,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub scope: Scope,
    /// Opened with `{`; implicit frames close when a sibling header appears
    pub braced: bool,
}

/// Explicit stack of open blocks.
#[derive(Debug, Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, scope: Scope, braced: bool) {
        tracing::debug!("Entering {:?} (braced: {})", scope, braced);
        self.frames.push(Frame { scope, braced });
    }

    pub fn top(&self) -> Option<&Scope> {
        self.frames.last().map(|f| &f.scope)
    }

    pub fn top_mut(&mut self) -> Option<&mut Scope> {
        self.frames.last_mut().map(|f| &mut f.scope)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Innermost table in scope, if any
    pub fn current_table(&self) -> Option<&TableKey> {
        self.frames.iter().rev().find_map(|f| match &f.scope {
            Scope::Table(key) => Some(key),
            _ => None,
        })
    }

    /// Pop every frame at `level` or deeper, innermost first.
    pub fn pop_to_level(&mut self, level: usize) -> Vec<Frame> {
        let mut popped = Vec::new();
        while self
            .frames
            .last()
            .is_some_and(|f| f.scope.level() >= level)
        {
            if let Some(frame) = self.frames.pop() {
                popped.push(frame);
            }
        }
        popped
    }

    /// Pop for a `}`: implicit frames on top go first, then the innermost
    /// braced frame. Returns nothing when no braced frame is open.
    pub fn pop_braced(&mut self) -> Vec<Frame> {
        let Some(idx) = self.frames.iter().rposition(|f| f.braced) else {
            return vec![];
        };
        self.frames.split_off(idx).into_iter().rev().collect()
    }

    pub fn pop_all(&mut self) -> Vec<Frame> {
        self.frames.drain(..).rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> TableKey {
        TableKey::new("inet", "filter")
    }

    fn chain(name: &str) -> Scope {
        Scope::Chain {
            table: key(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_pop_braced_takes_implicit_frames_with_it() {
        let mut stack = ScopeStack::new();
        stack.push(Scope::Table(key()), true);
        stack.push(chain("input"), false);

        let popped = stack.pop_braced();
        assert_eq!(popped.len(), 2);
        assert!(matches!(popped[0].scope, Scope::Chain { .. }));
        assert!(matches!(popped[1].scope, Scope::Table(_)));
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn test_pop_braced_without_open_block() {
        let mut stack = ScopeStack::new();
        stack.push(Scope::Table(key()), false);
        assert!(stack.pop_braced().is_empty());
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_pop_to_level_keeps_table() {
        let mut stack = ScopeStack::new();
        stack.push(Scope::Table(key()), true);
        stack.push(chain("input"), true);

        let popped = stack.pop_to_level(2);
        assert_eq!(popped.len(), 1);
        assert_eq!(stack.current_table(), Some(&key()));
        assert_eq!(stack.top().map(Scope::level), Some(1));
    }
}
