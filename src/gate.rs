//! Shared-secret access gate.
//!
//! The secret is compared verbatim with what the user types. There is no
//! hashing, rate limiting, or expiry: this keeps casual visitors out of a
//! demo page and is not an authentication mechanism.

#[derive(Debug, Clone)]
pub struct AccessGate {
    secret: Option<String>,
    unlocked: bool,
}

impl AccessGate {
    /// `None` means no gate: every session starts unlocked.
    pub fn new(secret: Option<String>) -> Self {
        let unlocked = secret.is_none();
        Self { secret, unlocked }
    }

    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Stateless comparison, for surfaces that check once per request.
    pub fn matches(&self, attempt: &str) -> bool {
        match &self.secret {
            Some(secret) => secret == attempt,
            None => true,
        }
    }

    /// Unlock on a match. Once unlocked, stays unlocked.
    pub fn try_unlock(&mut self, attempt: &str) -> bool {
        if !self.unlocked && self.matches(attempt) {
            self.unlocked = true;
        }
        self.unlocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_secret_means_open() {
        let gate = AccessGate::new(None);
        assert!(!gate.is_configured());
        assert!(gate.is_unlocked());
        assert!(gate.matches("anything"));
    }

    #[test]
    fn wrong_then_right_secret() {
        let mut gate = AccessGate::new(Some("opensesame".into()));
        assert!(!gate.is_unlocked());
        assert!(!gate.try_unlock("open sesame"));
        assert!(!gate.try_unlock("OPENSESAME"));
        assert!(gate.try_unlock("opensesame"));
        assert!(gate.try_unlock("wrong now but already open"));
    }

    #[test]
    fn comparison_is_verbatim() {
        let gate = AccessGate::new(Some("pw".into()));
        assert!(!gate.matches(" pw"));
        assert!(gate.matches("pw"));
    }
}
