use std::fmt;

use crate::source::FrameSource;

/// Monotonic session counter value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// Cancellation token carried by every asynchronous step of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionToken {
    generation: Generation,
}

impl SessionToken {
    pub fn generation(self) -> Generation {
        self.generation
    }
}

/// Hands out strictly increasing generations. Bumping invalidates every token
/// issued before it.
#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: Generation,
}

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Generation {
        self.current
    }

    pub fn bump(&mut self) -> Generation {
        self.current = Generation(self.current.0 + 1);
        self.current
    }
}

/// One start..stop span of streaming from a single source.
pub struct StreamSession {
    active: bool,
    source: Box<dyn FrameSource>,
    generation: Generation,
}

impl StreamSession {
    pub(crate) fn new(source: Box<dyn FrameSource>, generation: Generation) -> Self {
        Self {
            active: true,
            source,
            generation,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn token(&self) -> SessionToken {
        SessionToken {
            generation: self.generation,
        }
    }

    /// True only for tokens of this generation while the session is active.
    pub fn is_current(&self, token: SessionToken) -> bool {
        self.active && token.generation == self.generation
    }

    pub fn source_mut(&mut self) -> &mut dyn FrameSource {
        self.source.as_mut()
    }

    pub fn describe_source(&self) -> String {
        self.source.describe()
    }

    /// Deactivate and give the source back.
    pub(crate) fn end(mut self) -> Box<dyn FrameSource> {
        self.active = false;
        self.source
    }
}
