use std::str::FromStr;

use uuid::Uuid;

use crate::STUB_UUID;

/// Bearer token, issued by the authentication service and attached to every request
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct AuthToken(pub Uuid);

impl AuthToken {
    pub fn stub() -> AuthToken {
        AuthToken(STUB_UUID)
    }

    pub fn to_header_value(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.as_hyphenated().encode_lower(&mut buf).to_string()
    }
}

impl FromStr for AuthToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<AuthToken, uuid::Error> {
        Uuid::try_parse(s.trim()).map(AuthToken)
    }
}
