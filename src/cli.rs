//! 基于凭据管理器的非交互式用户管理。

use thiserror::Error;

use crate::config::UserCommand;
use crate::manager::{AuthError, CredentialManager};

#[derive(Debug, Error)]
#[error("cant {action} {username}: {source}")]
pub struct CliError {
    action: &'static str,
    username: String,
    #[source]
    source: AuthError,
}

impl CliError {
    fn new<'a>(action: &'static str, username: &'a str) -> impl FnOnce(AuthError) -> Self + 'a {
        move |source| Self {
            action,
            username: username.to_string(),
            source,
        }
    }
}

/// 执行一个 `user` 子命令，成功时返回要输出的文本。
pub async fn run_user_command(
    manager: &CredentialManager,
    command: UserCommand,
) -> Result<String, CliError> {
    match command {
        UserCommand::Add(args) => {
            manager
                .add(&args.username, &args.password)
                .await
                .map_err(CliError::new("add", &args.username))?;
            Ok(format!("User {} added", args.username))
        }
        UserCommand::ChangePassword(args) => {
            manager
                .change_password(&args.username, &args.password)
                .await
                .map_err(CliError::new("change password of", &args.username))?;
            Ok("Password changed".to_string())
        }
        UserCommand::Del { username, yes } => {
            manager
                .has_username(&username)
                .await
                .map_err(CliError::new("delete", &username))?;
            if !yes {
                return Ok(format!(
                    "Not deleting {username}: pass --yes to remove the user and all its data"
                ));
            }
            manager
                .delete(&username)
                .await
                .map_err(CliError::new("delete", &username))?;
            Ok(format!("{username} deleted"))
        }
        UserCommand::List => {
            let users = manager
                .list()
                .await
                .map_err(CliError::new("list", "users"))?;
            if users.is_empty() {
                return Ok("Users not found".to_string());
            }
            Ok(users
                .iter()
                .map(|user| {
                    if user.is_admin {
                        format!("{} (admin)", user.username)
                    } else {
                        user.username.clone()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n"))
        }
        UserCommand::Role { username } => {
            let is_admin = manager
                .is_admin(&username)
                .await
                .map_err(CliError::new("change role of", &username))?;
            manager
                .set_administrator_permits(&username, !is_admin)
                .await
                .map_err(CliError::new("change role of", &username))?;
            let role = if is_admin { "is user" } else { "is admin" };
            Ok(format!("User {username} {role}"))
        }
    }
}
