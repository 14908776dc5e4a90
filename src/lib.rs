pub mod executor;
pub mod jobfile;
pub mod launcher;
pub mod line_reader;
pub mod parser;
pub mod queue;
pub mod types;
pub mod util;
