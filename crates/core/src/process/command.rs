use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// An external tool invocation: program, arguments, working directory and
/// optional bytes piped to its stdin.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
    working_dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Run from the directory containing the program. Tools that load
    /// models relative to themselves need this.
    pub fn in_program_dir(self) -> Self {
        let dir = self
            .program
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf);
        match dir {
            Some(dir) => self.current_dir(dir),
            None => self,
        }
    }

    pub fn stdin(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(bytes.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Program name for logs and error messages.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn stdin_bytes(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn program_dir_becomes_working_dir() {
        let cmd = ToolCommand::new("/opt/tools/mdx/run.sh").in_program_dir();
        assert_eq!(cmd.working_dir(), Some(Path::new("/opt/tools/mdx")));
        assert_eq!(cmd.display_name(), "run.sh");
    }

    #[test]
    fn bare_program_keeps_current_dir() {
        let cmd = ToolCommand::new("ffmpeg").in_program_dir();
        assert_eq!(cmd.working_dir(), None);
    }

    #[test]
    fn builder_collects_args_and_stdin() {
        let cmd = ToolCommand::new("tts")
            .arg("--model_name")
            .args(["m", "--out_path", "o.wav"])
            .stdin("hello");
        assert_eq!(cmd.arguments().len(), 4);
        assert_eq!(cmd.stdin_bytes(), Some(&b"hello"[..]));
    }
}
