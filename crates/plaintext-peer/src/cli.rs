use core::time::Duration;

use calimero_plaintext::Config;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use const_format::concatcp;
use eyre::{bail, Result as EyreResult};

use crate::config::ConfigFile;
use crate::defaults;

mod dial;
mod encoding;
mod init;
mod listen;

use dial::DialCommand;
use encoding::EncodingArg;
use init::InitCommand;
use listen::ListenCommand;

pub const EXAMPLES: &str = r"
  # Create an identity and listen on port 4001
  $ plaintext-peer --home data/ init --port 4001
  $ plaintext-peer --home data/ listen

  # Dial a listener, pinning its peer id
  $ plaintext-peer --home other/ dial 127.0.0.1:4001 --peer 12D3KooW...

  # Announce the identity inside an exchange envelope
  $ plaintext-peer --home data/ listen --encoding envelope
";

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(after_help = concatcp!(
    "Environment variables:\n",
    "  PLAINTEXT_PEER_HOME    Directory for config\n\n",
    "Examples:",
    EXAMPLES
))]
pub struct RootCommand {
    #[command(flatten)]
    pub args: RootArgs,

    #[command(subcommand)]
    pub action: SubCommands,
}

#[derive(Debug, Subcommand)]
pub enum SubCommands {
    Init(InitCommand),
    #[command(alias = "up")]
    Listen(ListenCommand),
    #[command(alias = "connect")]
    Dial(DialCommand),
}

#[derive(Debug, Parser)]
pub struct RootArgs {
    /// Directory for config
    #[arg(long, value_name = "PATH", default_value_t = defaults::default_home_dir())]
    #[arg(env = "PLAINTEXT_PEER_HOME", hide_env_values = true)]
    pub home: Utf8PathBuf,
}

impl RootArgs {
    pub fn load_config(&self) -> EyreResult<ConfigFile> {
        if !ConfigFile::exists(&self.home) {
            bail!("Peer is not initialized in {:?}", self.home);
        }

        ConfigFile::load(&self.home)
    }
}

/// Handshake knobs shared by `listen` and `dial`.
#[derive(Debug, Args)]
pub struct HandshakeArgs {
    /// Give up on a handshake after this many milliseconds
    #[arg(long, value_name = "MILLIS", default_value_t = defaults::DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Override the identity encoding configured in config.toml
    #[arg(long, value_enum)]
    pub encoding: Option<EncodingArg>,
}

impl HandshakeArgs {
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn config(&self, file: &ConfigFile) -> Config {
        let mut settings = file.handshake;

        if let Some(encoding) = self.encoding {
            settings.encoding = encoding.into();
        }

        Config::from_keypair(&file.identity).with_settings(settings)
    }
}

impl RootCommand {
    pub async fn run(self) -> EyreResult<()> {
        match self.action {
            SubCommands::Init(init) => init.run(&self.args),
            SubCommands::Listen(listen) => listen.run(&self.args).await,
            SubCommands::Dial(dial) => dial.run(&self.args).await,
        }
    }
}
