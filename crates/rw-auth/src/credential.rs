use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};

use crate::config::{TOKEN_EXPIRY_SKEW, XBOX_FALLBACK_LIFETIME};

/// Upper bound on provider-reported lifetimes (one year)
const MAX_EXPIRES_IN: u64 = 365 * 24 * 3600;

/// The five credentials the chain manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKind {
    MicrosoftRefresh,
    MicrosoftAccess,
    XboxLive,
    Xsts,
    Minecraft,
}

impl CredentialKind {
    pub const ALL: [Self; 5] = [
        Self::MicrosoftRefresh,
        Self::MicrosoftAccess,
        Self::XboxLive,
        Self::Xsts,
        Self::Minecraft,
    ];

    /// Acquirable stages, upstream first
    pub const CHAIN: [Self; 4] = [
        Self::MicrosoftAccess,
        Self::XboxLive,
        Self::Xsts,
        Self::Minecraft,
    ];

    /// Prefix of the settings keys holding this credential
    pub fn key_prefix(self) -> &'static str {
        match self {
            Self::MicrosoftRefresh => "ms_refresh",
            Self::MicrosoftAccess => "ms_access",
            Self::XboxLive => "xbl",
            Self::Xsts => "xsts",
            Self::Minecraft => "mc",
        }
    }

    /// The credential this one is exchanged from
    pub fn dependency(self) -> Option<Self> {
        match self {
            Self::MicrosoftRefresh => None,
            Self::MicrosoftAccess => Some(Self::MicrosoftRefresh),
            Self::XboxLive => Some(Self::MicrosoftAccess),
            Self::Xsts => Some(Self::XboxLive),
            Self::Minecraft => Some(Self::Xsts),
        }
    }

    /// Every credential derived, directly or not, from this one
    pub fn downstream(self) -> &'static [Self] {
        match self {
            Self::MicrosoftRefresh => &Self::CHAIN,
            Self::MicrosoftAccess => &Self::CHAIN[1..],
            Self::XboxLive => &Self::CHAIN[2..],
            Self::Xsts => &Self::CHAIN[3..],
            Self::Minecraft => &[],
        }
    }

    /// Stages from the top of the chain down to and including `self`
    pub fn chain_to(self) -> &'static [Self] {
        match Self::CHAIN.iter().position(|kind| *kind == self) {
            Some(pos) => &Self::CHAIN[..=pos],
            None => &[],
        }
    }

    /// Xbox Live and XSTS tokens are unusable without their user hash
    pub fn requires_user_hash(self) -> bool {
        matches!(self, Self::XboxLive | Self::Xsts)
    }

    /// The refresh token has no expiry of its own
    pub fn expires(self) -> bool {
        self != Self::MicrosoftRefresh
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MicrosoftRefresh => "Microsoft refresh",
            Self::MicrosoftAccess => "Microsoft access",
            Self::XboxLive => "Xbox Live",
            Self::Xsts => "XSTS",
            Self::Minecraft => "Minecraft",
        })
    }
}

/// One cached credential.
///
/// `expires_at` already has [`TOKEN_EXPIRY_SKEW`] subtracted and is kept at
/// whole-second precision, matching what the store persists.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub kind: CredentialKind,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub user_hash: Option<String>,
}

impl CredentialRecord {
    /// Record expiring at an absolute instant, skew not yet applied
    pub fn expiring_at(kind: CredentialKind, token: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            token: token.into(),
            expires_at: Some((at - skew()).trunc_subsecs(0)),
            user_hash: None,
        }
    }

    /// Record for a relative `expires_in` lifetime in seconds
    pub fn expiring_in(kind: CredentialKind, token: impl Into<String>, expires_in: u64) -> Self {
        let lifetime = chrono::Duration::seconds(expires_in.min(MAX_EXPIRES_IN) as i64);
        Self::expiring_at(kind, token, Utc::now() + lifetime)
    }

    /// Xbox Live / XSTS record, trusting `NotAfter` when it parses
    pub fn from_not_after(
        kind: CredentialKind,
        token: impl Into<String>,
        not_after: Option<&str>,
    ) -> Self {
        let at = not_after
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(|| {
                Utc::now()
                    + chrono::Duration::from_std(XBOX_FALLBACK_LIFETIME)
                        .unwrap_or(chrono::Duration::hours(23))
            });
        Self::expiring_at(kind, token, at)
    }

    /// Microsoft refresh token, never expires by time
    pub fn refresh_token(token: impl Into<String>) -> Self {
        Self {
            kind: CredentialKind::MicrosoftRefresh,
            token: token.into(),
            expires_at: None,
            user_hash: None,
        }
    }

    pub fn with_user_hash(mut self, user_hash: impl Into<String>) -> Self {
        self.user_hash = Some(user_hash.into());
        self
    }

    pub fn user_hash(&self) -> Option<&str> {
        self.user_hash.as_deref().filter(|uhs| !uhs.is_empty())
    }

    /// Fresh at `now`: non-empty token, paired hash where required, not expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        if self.kind.requires_user_hash() && self.user_hash().is_none() {
            return false;
        }
        match self.expires_at {
            Some(expires_at) => now < expires_at,
            None => !self.kind.expires(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("kind", &self.kind)
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_hash", &self.user_hash)
            .finish()
    }
}

fn skew() -> chrono::Duration {
    chrono::Duration::from_std(TOKEN_EXPIRY_SKEW).unwrap_or(chrono::Duration::seconds(60))
}
