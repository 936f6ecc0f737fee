//! One-time-code challenge: digit slots, countdown, and resend gating.
//!
//! Pure state; the app owns the timer and network effects and feeds their
//! results back in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::TimerId;
use crate::OTP_CODE_LENGTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OtpStatus {
    Idle,
    Requested,
    Verifying,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum Phase {
    Idle,
    Requesting,
    Requested,
    Resending,
    Verifying,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OtpError {
    #[error("all {expected} code digits must be entered")]
    IncompleteCode { expected: usize },
    #[error("the challenge is not waiting for a code")]
    NotReady,
    #[error("resend is not available yet")]
    ResendNotAllowed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Stale or unknown timer; nothing changed.
    Ignored,
    /// Countdown moved; schedule the next tick.
    Continue,
    /// Countdown reached zero; resend is now available.
    Expired,
}

/// Identifies one login attempt. Responses carry it back so results for an
/// abandoned or replaced challenge can be told apart from the live one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtpChallenge {
    attempt: AttemptId,
    phone_number: String,
    region: String,
    city: String,
    digits: [Option<char>; OTP_CODE_LENGTH],
    focused: usize,
    seconds_remaining: u32,
    can_resend: bool,
    phase: Phase,
    last_attempt_failed: bool,
    timer: Option<TimerId>,
}

impl OtpChallenge {
    #[must_use]
    pub fn new(
        attempt: AttemptId,
        phone_number: impl Into<String>,
        region: impl Into<String>,
        city: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            phone_number: phone_number.into(),
            region: region.into(),
            city: city.into(),
            digits: [None; OTP_CODE_LENGTH],
            focused: 0,
            seconds_remaining: 0,
            can_resend: false,
            phase: Phase::Idle,
            last_attempt_failed: false,
            timer: None,
        }
    }

    #[must_use]
    pub const fn attempt(&self) -> AttemptId {
        self.attempt
    }

    #[must_use]
    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn city(&self) -> &str {
        &self.city
    }

    #[must_use]
    pub const fn digits(&self) -> &[Option<char>; OTP_CODE_LENGTH] {
        &self.digits
    }

    #[must_use]
    pub const fn focused(&self) -> usize {
        self.focused
    }

    #[must_use]
    pub const fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    #[must_use]
    pub const fn can_resend(&self) -> bool {
        self.can_resend && matches!(self.phase, Phase::Requested)
    }

    #[must_use]
    pub const fn timer(&self) -> Option<TimerId> {
        self.timer
    }

    #[must_use]
    pub const fn is_requesting(&self) -> bool {
        matches!(self.phase, Phase::Requesting | Phase::Resending)
    }

    #[must_use]
    pub const fn status(&self) -> OtpStatus {
        match self.phase {
            Phase::Idle | Phase::Requesting => OtpStatus::Idle,
            Phase::Requested if self.last_attempt_failed => OtpStatus::Failed,
            Phase::Requested | Phase::Resending => OtpStatus::Requested,
            Phase::Verifying => OtpStatus::Verifying,
            Phase::Verified => OtpStatus::Verified,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    #[must_use]
    pub fn can_verify(&self) -> bool {
        matches!(self.phase, Phase::Requested) && self.is_complete()
    }

    #[must_use]
    pub fn code(&self) -> String {
        self.digits.iter().flatten().collect()
    }

    pub fn begin_request(&mut self) -> bool {
        if !matches!(self.phase, Phase::Idle) {
            return false;
        }
        self.phase = Phase::Requesting;
        true
    }

    pub fn request_failed(&mut self) {
        if matches!(self.phase, Phase::Requesting) {
            self.phase = Phase::Idle;
        }
    }

    /// The code was issued: enter `Requested` and start counting down.
    pub fn start(&mut self, countdown_secs: u32, timer: TimerId) {
        self.phase = Phase::Requested;
        self.seconds_remaining = countdown_secs;
        self.can_resend = false;
        self.timer = Some(timer);
    }

    pub fn tick(&mut self, id: TimerId) -> TickOutcome {
        if self.timer != Some(id) || self.seconds_remaining == 0 {
            return TickOutcome::Ignored;
        }
        self.seconds_remaining -= 1;
        if self.seconds_remaining == 0 {
            self.can_resend = true;
            self.timer = None;
            TickOutcome::Expired
        } else {
            TickOutcome::Continue
        }
    }

    /// Writes one slot. A multi-digit value (paste) fills consecutive slots.
    pub fn set_digit(&mut self, index: usize, text: &str) {
        if index >= OTP_CODE_LENGTH || !self.accepts_input() {
            return;
        }
        self.last_attempt_failed = false;

        let entered: Vec<char> = text.chars().filter(char::is_ascii_digit).collect();
        if text.is_empty() {
            self.digits[index] = None;
            return;
        }
        if entered.is_empty() {
            return;
        }

        let mut slot = index;
        for c in entered.iter().take(OTP_CODE_LENGTH - index) {
            self.digits[slot] = Some(*c);
            slot += 1;
        }
        self.focused = slot.min(OTP_CODE_LENGTH - 1);
    }

    pub fn backspace(&mut self, index: usize) {
        if index >= OTP_CODE_LENGTH || !self.accepts_input() {
            return;
        }
        self.last_attempt_failed = false;

        if self.digits[index].is_some() {
            self.digits[index] = None;
            self.focused = index;
        } else if index > 0 {
            self.focused = index - 1;
        }
    }

    pub fn focus(&mut self, index: usize) {
        if index < OTP_CODE_LENGTH {
            self.focused = index;
        }
    }

    pub fn begin_verify(&mut self) -> Result<String, OtpError> {
        if !matches!(self.phase, Phase::Requested) {
            return Err(OtpError::NotReady);
        }
        if !self.is_complete() {
            return Err(OtpError::IncompleteCode {
                expected: OTP_CODE_LENGTH,
            });
        }
        self.phase = Phase::Verifying;
        self.last_attempt_failed = false;
        Ok(self.code())
    }

    /// Back to the pre-verify state; digits and countdown are untouched.
    pub fn verify_failed(&mut self) {
        if matches!(self.phase, Phase::Verifying) {
            self.phase = Phase::Requested;
            self.last_attempt_failed = true;
        }
    }

    /// Returns the running timer, which the caller must cancel.
    pub fn verified(&mut self) -> Option<TimerId> {
        self.phase = Phase::Verified;
        self.timer.take()
    }

    /// Returns the superseded timer, if one was still running.
    pub fn begin_resend(&mut self, countdown_secs: u32) -> Result<Option<TimerId>, OtpError> {
        if !self.can_resend() {
            return Err(OtpError::ResendNotAllowed);
        }
        self.phase = Phase::Resending;
        self.can_resend = false;
        self.seconds_remaining = countdown_secs;
        self.last_attempt_failed = false;
        Ok(self.timer.take())
    }

    pub fn resend_succeeded(&mut self, timer: TimerId) {
        if matches!(self.phase, Phase::Resending) {
            self.phase = Phase::Requested;
            self.timer = Some(timer);
        }
    }

    /// Falls back to a resendable state so the user can try again.
    pub fn resend_failed(&mut self) {
        if matches!(self.phase, Phase::Resending) {
            self.phase = Phase::Requested;
            self.seconds_remaining = 0;
            self.can_resend = true;
        }
    }

    pub fn abandon(&mut self) -> Option<TimerId> {
        self.timer.take()
    }

    const fn accepts_input(&self) -> bool {
        !matches!(self.phase, Phase::Verifying | Phase::Verified)
    }
}
