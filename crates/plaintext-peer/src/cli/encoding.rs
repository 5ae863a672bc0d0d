use calimero_plaintext::IdentityEncoding;
use clap::ValueEnum;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum EncodingArg {
    KeyRecord,
    Envelope,
}

impl From<EncodingArg> for IdentityEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::KeyRecord => Self::KeyRecord,
            EncodingArg::Envelope => Self::Envelope,
        }
    }
}
