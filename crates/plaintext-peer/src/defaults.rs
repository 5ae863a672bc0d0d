use camino::{Utf8Path, Utf8PathBuf};
use dirs::home_dir;

pub const DEFAULT_PEER_HOME: &str = ".plaintext-peer";
pub const DEFAULT_PORT: u16 = 4001;
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

pub fn default_home_dir() -> Utf8PathBuf {
    if let Some(home) = home_dir() {
        if let Some(home) = Utf8Path::from_path(&home) {
            return home.join(DEFAULT_PEER_HOME);
        }
    }

    Utf8PathBuf::from(DEFAULT_PEER_HOME)
}
