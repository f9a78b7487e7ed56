use std::fmt::Display;
use std::path::PathBuf;

/// An extension trait for [std::process::Command]
pub trait CommandExt {
    /// Provide a [DisplayCommand] that can be used to display
    /// POSIX like formatting of the command.
    fn display(&self) -> DisplayCommand;
}

impl CommandExt for std::process::Command {
    fn display(&self) -> DisplayCommand {
        DisplayCommand(self)
    }
}

pub struct DisplayCommand<'a>(&'a std::process::Command);

impl Display for DisplayCommand<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let command = self.0;

        let args = command
            .get_args()
            .map(|a| shell_escape::escape(a.to_string_lossy()));

        write!(f, "{}", command.get_program().to_string_lossy())?;
        for arg in args {
            write!(f, " {}", arg)?;
        }

        Ok(())
    }
}

/// Locate `executable` in `$PATH`, returning the full path of the first hit.
///
/// The lookup only checks that a regular file of that name exists in a path
/// entry, which is as much as `which(1)` promises without stat-ing for
/// permission bits.
pub fn find_in_path(executable: impl AsRef<str>) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(executable.as_ref()))
        .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use std::process::Command;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn display_command_escapes_arguments() {
        let mut command = Command::new("bash");
        command.args(["-c", "echo $HOME && sleep 1"]);
        assert_eq!(
            command.display().to_string(),
            "bash -c 'echo $HOME && sleep 1'"
        );
    }

    #[test]
    fn find_in_path_picks_first_entry() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(first.path().join("sometool"), "").unwrap();
        std::fs::write(second.path().join("sometool"), "").unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        temp_env::with_var("PATH", Some(&path_var), || {
            assert_eq!(
                find_in_path("sometool"),
                Some(first.path().join("sometool"))
            );
        });
    }

    #[test]
    fn find_in_path_misses_absent_tool() {
        let dir = tempfile::tempdir().unwrap();
        temp_env::with_var("PATH", Some(dir.path()), || {
            assert_eq!(find_in_path("definitely-not-here"), None);
        });
    }
}
