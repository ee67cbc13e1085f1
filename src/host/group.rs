use declarative::{ActionError, CommandOutput, CommandRunner, GroupManager};

use crate::runner::ProcessRunner;

/// `getent` exit code for "key not found"
const GETENT_NOT_FOUND: i32 = 2;

/// Group membership through `getent` and `gpasswd`
pub struct SystemGroups<R = ProcessRunner> {
    runner: R,
}

impl<R: CommandRunner> SystemGroups<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, ActionError> {
        if cfg!(windows) {
            return Err(ActionError::group("group membership is only managed on Unix hosts"));
        }
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.runner.run(program, &args)
    }
}

/// Members listed in a `group(5)` line
fn parse_group_line(line: &str) -> Option<Vec<String>> {
    let members = line.trim_end().splitn(4, ':').nth(3)?;
    Some(
        members
            .split(',')
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

impl<R: CommandRunner> GroupManager for SystemGroups<R> {
    fn members(&self, group: &str) -> Result<Vec<String>, ActionError> {
        let out = self.run("getent", &["group", group])?;
        match out.exit_code {
            Some(0) => parse_group_line(&out.stdout_str()).ok_or_else(|| {
                ActionError::group(format!("unexpected getent output for {group}"))
            }),
            Some(GETENT_NOT_FOUND) => Err(ActionError::group(format!("no such group {group}"))),
            _ => Err(ActionError::group(format!(
                "getent group {group}: {}",
                out.stderr_str().trim()
            ))),
        }
    }

    fn set_members(&self, group: &str, members: &[String]) -> Result<(), ActionError> {
        let list = members.join(",");
        log::info!("Setting members of {group} to {list}");
        let out = self.run("gpasswd", &["-M", &list, group])?;
        if !out.success() {
            return Err(ActionError::group(format!(
                "gpasswd -M {list} {group}: {}",
                out.stderr_str().trim()
            )));
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::host::testing::ScriptedRunner;

    #[test]
    fn test_parse_group_line() {
        assert_eq!(
            parse_group_line("www-data:x:33:nginx,deploy\n").unwrap(),
            ["nginx", "deploy"]
        );
        assert!(parse_group_line("www-data:x:33:\n").unwrap().is_empty());
        assert_eq!(parse_group_line("garbage"), None);
    }

    #[test]
    fn test_members_of_existing_group() {
        let runner = ScriptedRunner::default();
        runner.reply("getent group www-data", 0, "www-data:x:33:nginx\n");
        let groups = SystemGroups::new(&runner);
        assert_eq!(groups.members("www-data").unwrap(), ["nginx"]);
    }

    #[test]
    fn test_missing_group() {
        let runner = ScriptedRunner::default();
        runner.reply("getent group nagios", GETENT_NOT_FOUND, "");
        let err = SystemGroups::new(&runner).members("nagios").unwrap_err();
        assert!(err.detail.contains("no such group nagios"));
    }

    #[test]
    fn test_set_members_uses_gpasswd() {
        let runner = ScriptedRunner::default();
        let groups = SystemGroups::new(&runner);
        groups
            .set_members("www-data", &["nginx".into(), "dd-agent".into()])
            .unwrap();
        assert_eq!(runner.calls(), ["gpasswd -M nginx,dd-agent www-data"]);
    }

    #[test]
    fn test_set_members_failure() {
        let runner = ScriptedRunner::default();
        runner.reply("gpasswd -M dd-agent www-data", 3, "");
        let err = SystemGroups::new(&runner)
            .set_members("www-data", &["dd-agent".into()])
            .unwrap_err();
        assert_eq!(err.kind, declarative::ActionErrorKind::GroupModify);
    }
}
