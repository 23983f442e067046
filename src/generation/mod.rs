mod buffer;
mod sampler;
mod stream;

pub use buffer::{DecodeBuffer, EmitCadence, Phase};
pub use sampler::{SamplingParams, sample};
pub use stream::{GenerationSettings, StreamingGenerator};
