/// A key/value pair yielded by cursors
pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Iteration direction of a forward cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Advisory hints for [`Bucket::cursor`](crate::Bucket::cursor).
///
/// Implementations may use them to prefetch; they never change what a cursor yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorHint {
    /// Caller expects to read keys sharing this prefix
    Prefix(Vec<u8>),
    /// Caller expects to start reading at this key
    KeyStart(Vec<u8>),
}

/// Options recognised by [`Bucket::forward_cursor`](crate::Bucket::forward_cursor)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorOption {
    Direction(Direction),
    Prefix(Vec<u8>),
    SkipFirst,
}

/// Resolved forward cursor configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CursorConfig {
    pub direction: Direction,
    pub prefix: Option<Vec<u8>>,
    pub skip_first: bool,
}

impl CursorConfig {
    /// Fold options left to right; later options win.
    pub fn new(opts: &[CursorOption]) -> Self {
        let mut config = CursorConfig::default();
        for opt in opts {
            match opt {
                CursorOption::Direction(d) => config.direction = *d,
                CursorOption::Prefix(p) => {
                    config.prefix = if p.is_empty() { None } else { Some(p.clone()) }
                }
                CursorOption::SkipFirst => config.skip_first = true,
            }
        }
        config
    }

    pub(crate) fn missing_prefix(&self, key: &[u8]) -> bool {
        match &self.prefix {
            Some(prefix) => !key.starts_with(prefix),
            None => false,
        }
    }
}

impl From<&[CursorOption]> for CursorConfig {
    fn from(opts: &[CursorOption]) -> Self {
        CursorConfig::new(opts)
    }
}
