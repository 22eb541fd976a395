//! 凭据记录、用户名与密码规则以及 bcrypt 哈希。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const MAX_USERNAME_LEN: usize = 64;
pub const MIN_PASSWORD_LEN: usize = 8;

static USERNAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9@_.\-]*$").expect("valid username pattern")
});

/// 由仓库持久化的凭据记录。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAuth {
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub is_admin: bool,
}

impl UserAuth {
    /// 仅当用户名与密码哈希都存在时记录才可用。
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password_hash.is_empty()
    }
}

/// 对外的用户视图，不包含密码哈希。
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRole {
    pub username: String,
    pub is_admin: bool,
}

impl From<UserAuth> for UserRole {
    fn from(auth: UserAuth) -> Self {
        Self {
            username: auth.username,
            is_admin: auth.is_admin,
        }
    }
}

pub fn valid_username(username: &str) -> bool {
    username.len() <= MAX_USERNAME_LEN && USERNAME_PATTERN.is_match(username)
}

pub fn valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_alphabetic())
        && password.chars().any(|c| c.is_ascii_digit())
}

pub fn valid_user_and_password(username: &str, password: &str) -> bool {
    valid_username(username) && valid_password(password)
}

/// 使用新的盐计算哈希，同一密码每次得到不同结果。
pub fn hash_password(password: &str, cost: u32) -> Result<String, bcrypt::BcryptError> {
    bcrypt::hash(password, cost)
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, bcrypt::BcryptError> {
    bcrypt::verify(password, hash)
}
