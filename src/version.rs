//! `about` 命令使用的产品说明与构建信息。

pub const ABOUT: &str = "Upload server for the Tella documentation app. Tella is designed to \
protect users in repressive environments; activists, journalists and civil society groups use it \
to document human rights violations, corruption or electoral fraud. Groups can deploy this server \
among their members to collect files directly from the app over a resumable upload protocol.";

/// 多行说明，后接版本与构建信息。
pub fn about_text() -> String {
    format!(
        "{ABOUT}\n\nversion: {}\ncommit_hash: {}\nbuild_time: {}\nbuild_env: {},{}",
        crate::build::PKG_VERSION,
        crate::build::SHORT_COMMIT,
        crate::build::BUILD_TIME,
        crate::build::RUST_VERSION,
        crate::build::RUST_CHANNEL
    )
}
