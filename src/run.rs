use log::info;
use simple_error::bail;
use std::process::Command;

use crate::policy::PolicyKind;
use crate::result::Result;
use crate::tracer::Tracer;

pub struct RunOptions {
    pub command: Vec<String>,
    pub policy: PolicyKind,
}

/// Run `opts.command` under the selected policy. Returns the exit code the
/// command terminated with.
pub fn run(opts: &RunOptions) -> Result<i32> {
    let (program, args) = match opts.command.split_first() {
        Some(split) => split,
        None => bail!("no command given"),
    };
    let mut cmd = Command::new(program);
    cmd.args(args);

    let mut tracer = Tracer::spawn(cmd)?;
    let mut policy = opts.policy.build();
    let code = tracer.run(policy.as_mut())?;

    if let Some(summary) = policy.summary() {
        info!("{}: {}", program, summary);
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command() {
        let opts = RunOptions {
            command: vec![],
            policy: PolicyKind::Passthrough,
        };
        assert!(run(&opts).is_err());
    }

    #[test]
    fn test_run() {
        let opts = RunOptions {
            command: vec!["/bin/sh".into(), "-c".into(), "exit 7".into()],
            policy: PolicyKind::SyncWrites,
        };
        assert_eq!(run(&opts).expect("run failed"), 7);
    }
}
