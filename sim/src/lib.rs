pub mod analysis;
mod asm;
pub mod compiler;
pub mod encode;
pub mod execute;
pub mod fixed;
pub mod fixture;
pub mod isa;
pub mod model;
pub mod program;
pub mod settings;
pub mod test;

pub use asm::assemble;
pub use compiler::{demodulator, output_pattern_from_input};
pub use encode::{encode, Rom};
pub use execute::{run_ops, run_rom};
pub use fixed::Fixed;
pub use program::OperationList;
pub use settings::Settings;
