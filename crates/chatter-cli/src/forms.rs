use std::sync::LazyLock;

use regex::Regex;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

const MIN_PASSWORD_LEN: usize = 6;

/// Signup screen state. Lives only while the screen is up; field errors are
/// set by the validators and cleared again when the field is edited.
#[derive(Debug, Default)]
pub struct SignupForm {
    name: String,
    email: String,
    password: String,
    confirm_password: String,
    pub email_error: Option<String>,
    pub password_error: Option<String>,
    pub confirm_password_error: Option<String>,
}

impl SignupForm {
    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_email(&mut self, email: &str) {
        self.email = email.trim().to_string();
        self.email_error = None;
    }

    pub fn set_password(&mut self, password: &str) {
        self.password = password.to_string();
        self.password_error = None;
    }

    pub fn set_confirm_password(&mut self, confirm_password: &str) {
        self.confirm_password = confirm_password.to_string();
        self.confirm_password_error = None;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn validate_email(&mut self) -> bool {
        if self.email.is_empty() {
            self.email_error = Some("Email cannot be empty".into());
            false
        } else if !EMAIL_PATTERN.is_match(&self.email) {
            self.email_error = Some("Invalid email format".into());
            false
        } else {
            true
        }
    }

    pub fn validate_password(&mut self) -> bool {
        if self.password.is_empty() {
            self.password_error = Some("Password cannot be empty".into());
            false
        } else if self.password.chars().count() < MIN_PASSWORD_LEN {
            self.password_error = Some("Password must be at least 6 characters".into());
            false
        } else {
            true
        }
    }

    pub fn validate_confirm_password(&mut self) -> bool {
        if self.confirm_password.is_empty() {
            self.confirm_password_error = Some("Please confirm password".into());
            false
        } else if self.confirm_password != self.password {
            self.confirm_password_error = Some("Passwords do not match".into());
            false
        } else {
            true
        }
    }

    /// Run every validator so all field errors show at once.
    pub fn validate(&mut self) -> bool {
        let email_ok = self.validate_email();
        let password_ok = self.validate_password();
        let confirm_ok = self.validate_confirm_password();
        email_ok && password_ok && confirm_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_email_sets_an_error() {
        let mut form = SignupForm::default();
        assert!(!form.validate_email());
        assert_eq!(form.email_error.as_deref(), Some("Email cannot be empty"));
    }

    #[test]
    fn malformed_email_sets_an_error() {
        let mut form = SignupForm::default();
        for bad in ["plainaddress", "missing@tld", "@nobody.example", "a b@c.de"] {
            form.set_email(bad);
            assert!(!form.validate_email(), "accepted {bad:?}");
            assert_eq!(form.email_error.as_deref(), Some("Invalid email format"));
        }
    }

    #[test]
    fn valid_email_passes_and_editing_clears_the_error() {
        let mut form = SignupForm::default();
        assert!(!form.validate_email());

        form.set_email("ada@example.com");
        assert!(form.email_error.is_none());
        assert!(form.validate_email());
    }

    #[test]
    fn email_is_trimmed_on_entry() {
        let mut form = SignupForm::default();
        form.set_email("  ada@example.com  ");
        assert!(form.validate_email());
        assert_eq!(form.email(), "ada@example.com");
    }

    #[test]
    fn short_password_gets_a_length_error() {
        let mut form = SignupForm::default();
        form.set_password("12345");
        assert!(!form.validate_password());
        assert_eq!(
            form.password_error.as_deref(),
            Some("Password must be at least 6 characters")
        );

        form.set_password("");
        assert!(!form.validate_password());
        assert_eq!(form.password_error.as_deref(), Some("Password cannot be empty"));

        form.set_password("123456");
        assert!(form.validate_password());
    }

    #[test]
    fn confirmation_must_match() {
        let mut form = SignupForm::default();
        form.set_password("secret123");

        assert!(!form.validate_confirm_password());
        assert_eq!(
            form.confirm_password_error.as_deref(),
            Some("Please confirm password")
        );

        form.set_confirm_password("different");
        assert!(!form.validate_confirm_password());
        assert_eq!(
            form.confirm_password_error.as_deref(),
            Some("Passwords do not match")
        );

        form.set_confirm_password("secret123");
        assert!(form.validate_confirm_password());
    }

    #[test]
    fn validate_reports_every_field_at_once() {
        let mut form = SignupForm::default();
        form.set_email("not-an-email");
        form.set_password("123");

        assert!(!form.validate());
        assert!(form.email_error.is_some());
        assert!(form.password_error.is_some());
        assert!(form.confirm_password_error.is_some());

        form.set_email("ada@example.com");
        form.set_password("secret123");
        form.set_confirm_password("secret123");
        assert!(form.validate());
    }
}
