use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Container encodings the recorder writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// 16-bit integer PCM in a WAV container
    #[default]
    Pcm16,
    /// 32-bit float PCM in a WAV container
    Float32,
}

impl OutputFormat {
    /// File extension (without the dot) for generated paths
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pcm16 | OutputFormat::Float32 => "wav",
        }
    }

    pub fn wav_spec(&self, sample_rate: u32, channels: u16) -> hound::WavSpec {
        match self {
            OutputFormat::Pcm16 => hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            OutputFormat::Float32 => hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 32,
                sample_format: hound::SampleFormat::Float,
            },
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Pcm16 => write!(f, "pcm16"),
            OutputFormat::Float32 => write!(f, "float32"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pcm16" => Ok(OutputFormat::Pcm16),
            "float32" => Ok(OutputFormat::Float32),
            other => anyhow::bail!("Unknown output format '{}' (expected pcm16 or float32)", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_output_format() {
        assert_eq!("pcm16".parse::<OutputFormat>().unwrap(), OutputFormat::Pcm16);
        assert_eq!("Float32".parse::<OutputFormat>().unwrap(), OutputFormat::Float32);
        assert!("mp3".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_wav_spec_bits() {
        assert_eq!(OutputFormat::Pcm16.wav_spec(44100, 1).bits_per_sample, 16);
        assert_eq!(OutputFormat::Float32.wav_spec(44100, 2).bits_per_sample, 32);
        assert_eq!(OutputFormat::Float32.extension(), "wav");
    }
}
