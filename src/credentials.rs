use crate::error::S3Error;
use std::env;
use std::fmt::{Debug, Formatter};

#[derive(Debug, Clone)]
pub struct AccessKeyId(pub String);

impl AsRef<str> for AccessKeyId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Clone)]
pub struct AccessKeySecret(pub String);

impl Debug for AccessKeySecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessKeySecret(<hidden>)")
    }
}

impl AsRef<str> for AccessKeySecret {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// Temporary STS credentials come with a token that must travel as
/// `x-amz-security-token` on every request.
#[derive(Clone)]
pub struct SessionToken(pub String);

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionToken(<hidden>)")
    }
}

impl AsRef<str> for SessionToken {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: AccessKeyId,
    pub access_key_secret: AccessKeySecret,
    pub session_token: Option<SessionToken>,
}

impl Credentials {
    pub fn new<S>(key: S, secret: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            access_key_id: AccessKeyId(key.into()),
            access_key_secret: AccessKeySecret(secret.into()),
            session_token: None,
        }
    }

    pub fn with_session_token<S: Into<String>>(mut self, token: S) -> Self {
        self.session_token = Some(SessionToken(token.into()));
        self
    }

    /// Reads `S3_ACCESS_KEY_ID`, `S3_ACCESS_KEY_SECRET` and the optional
    /// `S3_SESSION_TOKEN`.
    pub fn try_from_env() -> Result<Self, S3Error> {
        let access_key_id = env::var("S3_ACCESS_KEY_ID")?;
        let access_key_secret = env::var("S3_ACCESS_KEY_SECRET")?;
        if access_key_id.is_empty() || access_key_secret.is_empty() {
            return Err(S3Error::Credentials(
                "S3_ACCESS_KEY_ID and S3_ACCESS_KEY_SECRET must not be empty".to_string(),
            ));
        }

        Ok(Self {
            access_key_id: AccessKeyId(access_key_id),
            access_key_secret: AccessKeySecret(access_key_secret),
            session_token: env::var("S3_SESSION_TOKEN").ok().map(SessionToken),
        })
    }
}
