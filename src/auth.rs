use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use ulid::Ulid;

use crate::model::{Actor, Role};

/// Every login shares one password. Identity is carried by the user name.
#[derive(Debug)]
pub struct CourtsideAuthSource {
    password: String,
}

impl CourtsideAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for CourtsideAuthSource {
    async fn get_password(&self, _login: &LoginInfo) -> PgWireResult<Password> {
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

/// Parse a login user of the form `<role>:<ulid>`, e.g. `operator:01H...`.
pub fn parse_actor(user: &str) -> Option<Actor> {
    let (role, id) = user.split_once(':')?;
    let role: Role = role.parse().ok()?;
    let id = Ulid::from_string(id.trim()).ok()?;
    Some(Actor::new(id, role))
}
