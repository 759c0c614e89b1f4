use std::sync::atomic::{AtomicBool, Ordering};

/// A boolean that can move from `false` to `true` exactly once.
///
/// ```
/// use vigil_incident::OnceFlag;
///
/// let flag = OnceFlag::new();
/// assert!(flag.try_set());
/// assert!(!flag.try_set());
/// assert!(flag.is_set());
/// ```
#[derive(Debug, Default)]
pub struct OnceFlag(AtomicBool);

impl OnceFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` only for the caller that performed the transition.
    pub fn try_set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A flag held by at most one caller at a time. The holder releases it by
/// dropping the returned [`Claim`].
///
/// ```
/// use vigil_incident::ClaimFlag;
///
/// let flag = ClaimFlag::new();
/// let claim = flag.try_claim().expect("free");
/// assert!(flag.try_claim().is_none());
/// drop(claim);
/// assert!(flag.try_claim().is_some());
/// ```
#[derive(Debug, Default)]
pub struct ClaimFlag(AtomicBool);

impl ClaimFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn try_claim(&self) -> Option<Claim<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Claim(&self.0))
    }
}

#[derive(Debug)]
#[must_use = "the claim is released as soon as it is dropped"]
pub struct Claim<'a>(&'a AtomicBool);

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
