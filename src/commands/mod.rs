// Command handlers module
pub mod metrics;
pub mod run;

pub use run::execute as run;
pub use run::execute_attach as attach;
