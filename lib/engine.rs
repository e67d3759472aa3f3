use anyhow::Result;

pub trait Engine {
    /// Evaluates one chunk of source and returns the printed result.
    fn run(&mut self, input: &str) -> Result<String>;

    /// Printed forms of the most recent results, newest first.
    fn trace(&self) -> Vec<String>;
}
