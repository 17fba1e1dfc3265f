/// Decoding compressed and PCM audio into memory
pub mod decode;
#[cfg(test)]
pub(crate) mod fixtures;
/// Walking dataset trees and writing normalized WAVs
pub mod normalize;
/// Downmix and sample-rate conversion
pub mod resample;

pub use decode::{decode_file, DecodedAudio};
pub use normalize::{normalize_tree, NormalizeOptions, NormalizeReport};
