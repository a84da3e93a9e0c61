/// The memoized result of an observation. `Empty` and `Present` are both computed: `Empty` means
/// nothing exists remotely and holds the placeholder snapshot that was returned for it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Cached<T> {
    NotComputed,
    Empty(T),
    Present(T),
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self::NotComputed
    }
}

impl<T> Cached<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Cached::NotComputed => None,
            Cached::Empty(value) | Cached::Present(value) => Some(value),
        }
    }

    pub fn is_computed(&self) -> bool {
        !matches!(self, Cached::NotComputed)
    }

    /// Whether the observation found a remote object.
    pub fn is_present(&self) -> bool {
        matches!(self, Cached::Present(_))
    }
}

/// The per-pass memory of a resource: at most one actual observation and one expected derivation.
#[derive(Clone, Debug, Default)]
pub struct ResourceCache<T> {
    actual: Cached<T>,
    expected: Cached<T>,
}

impl<T> ResourceCache<T>
where
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            actual: Cached::NotComputed,
            expected: Cached::NotComputed,
        }
    }

    pub fn actual(&self) -> &Cached<T> {
        &self.actual
    }

    pub fn expected(&self) -> &Cached<T> {
        &self.expected
    }

    /// Remember an actual observation and hand back a copy of it. `found` tells whether a remote
    /// object backs the snapshot.
    pub fn cache_actual(&mut self, value: T, found: bool) -> T {
        self.actual = if found {
            Cached::Present(value.clone())
        } else {
            Cached::Empty(value.clone())
        };
        value
    }

    pub fn cache_expected(&mut self, value: T) -> T {
        self.expected = Cached::Present(value.clone());
        value
    }

    pub fn clear(&mut self) {
        self.actual = Cached::NotComputed;
        self.expected = Cached::NotComputed;
    }
}
