//! Locator catalog for the webmail UI.
//!
//! Every semantic target is a [`LocatorSet`]: primary selector first,
//! alternates after, in the order resolution should try them. The UI's
//! generated class names churn between sessions, which is why nearly every
//! set carries an attribute- or text-based fallback. New alternates are
//! added here as data; flow code never grows selector branches.

use crate::config;
use crate::locator::{Locator, LocatorSet, Selector};
use crate::state::StateProbes;

/// Sign-in and challenge targets.
pub mod login {
    use super::*;

    /// Identity (email) input on the provider's first page
    #[must_use]
    pub fn identity_input() -> LocatorSet {
        LocatorSet::new("identity input", Locator::new(r#"input[type="email"]"#))
            .with_css_fallback("#identifierId")
    }

    /// Continue button after the identity field
    #[must_use]
    pub fn identity_next() -> LocatorSet {
        LocatorSet::new("identity next", Locator::new("#identifierNext"))
    }

    /// Secret (password) input
    #[must_use]
    pub fn secret_input() -> LocatorSet {
        LocatorSet::new("secret input", Locator::new(r#"input[type="password"]"#))
            .with_css_fallback(r#"input[name="Passwd"]"#)
    }

    /// Continue button after the secret field
    #[must_use]
    pub fn secret_next() -> LocatorSet {
        LocatorSet::new("secret next", Locator::new("#passwordNext"))
    }

    /// Inline credential error banners (bad identity or secret)
    #[must_use]
    pub fn credential_error() -> LocatorSet {
        LocatorSet::new("credential error", Locator::new(".LXRPh"))
            .with_css_fallback(".Ekjuhf")
            .with_css_fallback(".k6Zj8d")
    }

    /// Copy shown when the provider refuses the account outright
    #[must_use]
    pub fn rejection_indicator() -> LocatorSet {
        LocatorSet::new(
            "rejection indicator",
            Locator::from_selector(Selector::text(config::ACCOUNT_DISABLED_TEXT)),
        )
        .with_fallback(Locator::from_selector(Selector::text(
            "We noticed unusual activity in your Google Account",
        )))
    }

    /// Second-factor code input
    #[must_use]
    pub fn challenge_input() -> LocatorSet {
        LocatorSet::new("challenge input", Locator::new(r#"input[name="totpPin"]"#))
            .with_css_fallback(r#"input[aria-label="Enter code"]"#)
    }

    /// Submit button on the challenge form
    #[must_use]
    pub fn challenge_next() -> LocatorSet {
        LocatorSet::new("challenge next", Locator::new("#totpNext"))
    }

    /// Wrong-code banner on the challenge form
    #[must_use]
    pub fn wrong_code_error() -> LocatorSet {
        LocatorSet::new(
            "wrong code error",
            Locator::from_selector(Selector::text(config::WRONG_CODE_TEXT)),
        )
    }

    /// Decline control on the stay-signed-in interstitial
    #[must_use]
    pub fn stay_signed_in_decline() -> LocatorSet {
        LocatorSet::new(
            "stay signed in decline",
            Locator::from_selector(Selector::xpath(r#"//span[text()="Not now"]"#)),
        )
    }
}

/// Inbox targets.
pub mod inbox {
    use super::*;

    /// Element only rendered inside the authenticated application
    #[must_use]
    pub fn authenticated_marker() -> LocatorSet {
        LocatorSet::new(
            "authenticated marker",
            Locator::new(r#"[data-test-id="inbox"]"#),
        )
        .with_css_fallback(".nH")
        .with_css_fallback(r#"[role="main"]"#)
    }

    /// Main mailbox container, the signal that the inbox finished loading
    #[must_use]
    pub fn container() -> LocatorSet {
        LocatorSet::new("inbox container", Locator::new(".nH"))
            .with_css_fallback(r#"[role="main"]"#)
    }

    /// Rows in the message list
    #[must_use]
    pub fn email_rows() -> LocatorSet {
        LocatorSet::new("email rows", Locator::new(".zA"))
    }

    /// Topmost message row
    #[must_use]
    pub fn first_email() -> LocatorSet {
        LocatorSet::new("first email", Locator::new(".zA:first-child"))
    }

    /// Compose button
    #[must_use]
    pub fn compose_button() -> LocatorSet {
        LocatorSet::new("compose button", Locator::new(".T-I.T-I-KE.L3"))
            .with_css_fallback(r#"div[data-tooltip="Compose"]"#)
            .with_fallback(Locator::from_selector(Selector::css_with_text(
                r#"[role="button"]"#,
                "Compose",
            )))
    }

    /// Control returning from an open message to the list
    #[must_use]
    pub fn back_to_inbox() -> LocatorSet {
        LocatorSet::new("back to inbox", Locator::new(".ar9.T-I-J3.J-J5-Ji"))
            .with_css_fallback(r#"button[aria-label*="Back"]"#)
            .with_css_fallback(r#"[title*="Back"]"#)
    }

    /// Signals of a bounced send in the message list
    #[must_use]
    pub fn delivery_failure() -> LocatorSet {
        LocatorSet::new(
            "delivery failure",
            Locator::new(r#"span[email="mailer-daemon@googlemail.com"]"#),
        )
        .with_fallback(Locator::from_selector(Selector::text("Address not found")))
        .with_fallback(Locator::from_selector(Selector::text(
            "Mail Delivery Subsystem",
        )))
    }
}

/// Compose window targets.
pub mod compose {
    use super::*;

    /// The compose window itself
    #[must_use]
    pub fn window() -> LocatorSet {
        LocatorSet::new("compose window", Locator::new(".nH.if")).with_css_fallback(".AD")
    }

    /// Recipient field
    #[must_use]
    pub fn recipient_input() -> LocatorSet {
        LocatorSet::new(
            "recipient input",
            Locator::new(r#"input[aria-label="To recipients"]"#),
        )
        .with_css_fallback(r#"textarea[aria-label="To recipients"]"#)
    }

    /// Subject field
    #[must_use]
    pub fn subject_input() -> LocatorSet {
        LocatorSet::new("subject input", Locator::new(r#"input[name="subjectbox"]"#))
            .with_css_fallback(r#"input[aria-label="Subject"]"#)
    }

    /// Message body editor
    #[must_use]
    pub fn body_input() -> LocatorSet {
        LocatorSet::new("body input", Locator::new(".Am.Al.editable"))
            .with_css_fallback(r#"div[aria-label="Message Body"]"#)
    }

    /// Send button
    #[must_use]
    pub fn send_button() -> LocatorSet {
        LocatorSet::new(
            "send button",
            Locator::new(".T-I.J-J5-Ji.aoO.v7.T-I-atl.L3"),
        )
        .with_css_fallback(r#"[data-tooltip="Send ⌘+Enter"]"#)
    }

    /// Toast confirming the message left
    #[must_use]
    pub fn send_confirmation() -> LocatorSet {
        LocatorSet::new("send confirmation", Locator::new(".vh"))
    }

    /// Validation errors inside the compose window
    #[must_use]
    pub fn validation_error() -> LocatorSet {
        LocatorSet::new("validation error", Locator::new(".vN"))
            .with_fallback(Locator::from_selector(Selector::text(
                config::RECIPIENT_REQUIRED_TEXT,
            )))
            .with_css_fallback(r#"[role="alert"]"#)
    }

    /// Confirmation dialog for a missing subject
    #[must_use]
    pub fn subject_warning() -> LocatorSet {
        LocatorSet::new(
            "subject warning",
            Locator::from_selector(Selector::text("Send this message without a subject")),
        )
    }

    /// Send-anyway control on the subject warning
    #[must_use]
    pub fn warning_confirm() -> LocatorSet {
        LocatorSet::new(
            "warning confirm",
            Locator::from_selector(Selector::css_with_text("button", "Send")),
        )
        .with_fallback(Locator::from_selector(Selector::text("Send")))
    }

    /// Modal error dialog over the compose window
    #[must_use]
    pub fn error_dialog() -> LocatorSet {
        LocatorSet::new("error dialog", Locator::new(r#"[role="alertdialog"]"#))
    }

    /// Dismiss control on the error dialog
    #[must_use]
    pub fn error_dialog_dismiss() -> LocatorSet {
        LocatorSet::new(
            "error dialog dismiss",
            Locator::new(r#"[data-mdc-dialog-action="ok"]"#),
        )
        .with_fallback(Locator::from_selector(Selector::css_with_text(
            "button", "OK",
        )))
    }
}

/// Sign-out targets.
pub mod logout {
    use super::*;

    /// Account avatar opening the profile menu
    #[must_use]
    pub fn account_button() -> LocatorSet {
        LocatorSet::new(
            "account button",
            Locator::new(r#"a[aria-label*="Google Account"]"#),
        )
        .with_css_fallback(r#"img[src*="googleusercontent"]"#)
        .with_css_fallback(r#"a[href*="SignOutOptions"]"#)
    }

    /// Sign-out control inside the profile menu
    #[must_use]
    pub fn sign_out() -> LocatorSet {
        LocatorSet::new(
            "sign out",
            Locator::from_selector(Selector::text("Sign out")),
        )
        .with_css_fallback(r#"a[href*="Logout"]"#)
        .with_fallback(Locator::from_selector(Selector::css_with_text(
            "span", "Sign out",
        )))
    }
}

/// The probe bundle the state verifier classifies with.
#[must_use]
pub fn state_probes() -> StateProbes {
    StateProbes {
        rejection: login::rejection_indicator(),
        challenge_input: login::challenge_input(),
        authenticated_marker: inbox::authenticated_marker(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_input_fallback_order() {
        let set = login::identity_input();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.candidates()[0].selector(),
            &Selector::css(r#"input[type="email"]"#)
        );
        assert_eq!(set.candidates()[1].selector(), &Selector::css("#identifierId"));
    }

    #[test]
    fn test_challenge_input_has_aria_fallback() {
        let set = login::challenge_input();
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.candidates()[1].selector(),
            &Selector::css(r#"input[aria-label="Enter code"]"#)
        );
    }

    #[test]
    fn test_wrong_code_uses_exact_banner_text() {
        let set = login::wrong_code_error();
        assert_eq!(
            set.candidates()[0].selector(),
            &Selector::text("Wrong code. Try again.")
        );
    }

    #[test]
    fn test_stay_signed_in_decline_is_xpath() {
        let set = login::stay_signed_in_decline();
        assert!(matches!(
            set.candidates()[0].selector(),
            Selector::XPath(_)
        ));
    }

    #[test]
    fn test_compose_button_text_fallback_last() {
        let set = inbox::compose_button();
        assert_eq!(set.len(), 3);
        assert!(matches!(
            set.candidates()[2].selector(),
            Selector::CssWithText { .. }
        ));
    }

    #[test]
    fn test_delivery_failure_covers_daemon_sender() {
        let set = inbox::delivery_failure();
        assert!(set
            .candidates()
            .iter()
            .any(|c| matches!(c.selector(), Selector::Css(s) if s.contains("mailer-daemon"))));
    }

    #[test]
    fn test_validation_error_includes_recipient_text() {
        let set = compose::validation_error();
        assert!(set
            .candidates()
            .iter()
            .any(|c| c.selector() == &Selector::text(config::RECIPIENT_REQUIRED_TEXT)));
    }

    #[test]
    fn test_state_probes_wiring() {
        let probes = state_probes();
        assert_eq!(probes.rejection.name(), "rejection indicator");
        assert_eq!(probes.challenge_input.name(), "challenge input");
        assert_eq!(probes.authenticated_marker.name(), "authenticated marker");
    }

    #[test]
    fn test_every_set_has_a_primary() {
        let sets = [
            login::identity_input(),
            login::identity_next(),
            login::secret_input(),
            login::secret_next(),
            login::credential_error(),
            login::rejection_indicator(),
            login::challenge_input(),
            login::challenge_next(),
            login::wrong_code_error(),
            login::stay_signed_in_decline(),
            inbox::authenticated_marker(),
            inbox::container(),
            inbox::email_rows(),
            inbox::first_email(),
            inbox::compose_button(),
            inbox::back_to_inbox(),
            inbox::delivery_failure(),
            compose::window(),
            compose::recipient_input(),
            compose::subject_input(),
            compose::body_input(),
            compose::send_button(),
            compose::send_confirmation(),
            compose::validation_error(),
            compose::subject_warning(),
            compose::warning_confirm(),
            compose::error_dialog(),
            compose::error_dialog_dismiss(),
            logout::account_button(),
            logout::sign_out(),
        ];
        for set in &sets {
            assert!(!set.is_empty(), "set {} lost its primary", set.name());
        }
    }
}
