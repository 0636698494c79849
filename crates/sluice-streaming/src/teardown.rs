//! Best-effort teardown of fallible cleanup steps.

/// A deferred, fallible cleanup action.
pub type CleanupHook = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// A cleanup step that failed.
#[derive(Debug)]
pub struct CleanupFailure {
    pub step: &'static str,
    pub error: anyhow::Error,
}

/// Run every step, regardless of earlier failures.
///
/// Failures are collected for diagnostics and never propagated.
pub fn run_best_effort<I>(steps: I) -> Vec<CleanupFailure>
where
    I: IntoIterator<Item = (&'static str, CleanupHook)>,
{
    steps
        .into_iter()
        .filter_map(|(step, hook)| hook().err().map(|error| CleanupFailure { step, error }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_all_steps_run_despite_failures() {
        let ran = Arc::new(Mutex::new(Vec::new()));
        let steps: Vec<(&'static str, CleanupHook)> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let ran = ran.clone();
                let hook: CleanupHook = Box::new(move || {
                    ran.lock().unwrap().push(name);
                    if name == "a" {
                        anyhow::bail!("first step failed");
                    }
                    Ok(())
                });
                (name, hook)
            })
            .collect();

        let failures = run_best_effort(steps);

        assert_eq!(*ran.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step, "a");
        assert_eq!(failures[0].error.to_string(), "first step failed");
    }

    #[test]
    fn test_no_steps() {
        assert!(run_best_effort(Vec::<(&'static str, CleanupHook)>::new()).is_empty());
    }
}
