/// Physical invocation boundary for a stage running as its own function.
pub trait StageInvoker {
    fn invoke_stage(&self, function_name: &str, payload: &[u8]) -> Result<Vec<u8>, String>;
}
