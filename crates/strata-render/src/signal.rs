//! The closed set of dynamic signals.

/// A read that ties render output to the current request or to a
/// nondeterministic input. Observing one of these inside a scope
/// contaminates it; a closed enum keeps classifier handling exhaustive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DynamicSignal {
    /// A request cookie was read.
    CookieRead(String),
    /// A request header was read.
    HeaderRead(String),
    /// A random number was drawn.
    RandomRead,
    /// The wall clock was read without memoization.
    ClockRead,
    /// An uncached external fetch was performed.
    UncachedFetch(String),
    /// A custom dynamic source.
    Custom(String),
}

impl DynamicSignal {
    /// Get the signal kind name.
    pub fn name(&self) -> &str {
        match self {
            Self::CookieRead(_) => "cookie",
            Self::HeaderRead(_) => "header",
            Self::RandomRead => "random",
            Self::ClockRead => "clock",
            Self::UncachedFetch(_) => "uncached-fetch",
            Self::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for DynamicSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CookieRead(name) => write!(f, "cookie:{}", name),
            Self::HeaderRead(name) => write!(f, "header:{}", name),
            Self::RandomRead => write!(f, "random"),
            Self::ClockRead => write!(f, "clock"),
            Self::UncachedFetch(url) => write!(f, "uncached-fetch:{}", url),
            Self::Custom(name) => write!(f, "custom:{}", name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_display() {
        assert_eq!(DynamicSignal::CookieRead("theme".into()).to_string(), "cookie:theme");
        assert_eq!(DynamicSignal::RandomRead.to_string(), "random");
        assert_eq!(DynamicSignal::Custom("geo".into()).name(), "geo");
    }
}
