//! Console surface — reads lines from stdin, submits them to the session's
//! orchestrator, and prints replies as they stream in.
//!
//! Lines starting with `/` are commands; anything else is a prompt sent with
//! the current model and any queued attachments. Runs until the `shutdown`
//! token is cancelled (Ctrl-C), `/quit`, or stdin closes. A submission in
//! progress is never interrupted.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::export;
use crate::chat::{Attachment, ConversationOrchestrator, Role, Turn, ValidationError};
use crate::error::AppError;
use crate::gate::AccessGate;

const HELP: &str = "\
Commands:
  /models          list available models
  /model <id>      switch model
  /attach <path>   queue a file for the next prompt
  /history         show the conversation so far
  /save [path]     write the conversation as Markdown
  /help            show this help
  /quit            leave";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Help,
    Models,
    Model(&'a str),
    Attach(&'a str),
    History,
    Save(Option<&'a str>),
    Quit,
    Unknown(&'a str),
    Prompt(&'a str),
}

fn parse_command(line: &str) -> Command<'_> {
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Command::Prompt(line);
    };
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest.trim(), ""),
    };
    match (name, arg) {
        ("help", _) => Command::Help,
        ("models", _) => Command::Models,
        ("model", id) if !id.is_empty() => Command::Model(id),
        ("attach", path) if !path.is_empty() => Command::Attach(path),
        ("history", _) => Command::History,
        ("save", "") => Command::Save(None),
        ("save", path) => Command::Save(Some(path)),
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(line.trim()),
    }
}

// ── Console ──────────────────────────────────────────────────────────────────

pub struct Console {
    orchestrator: ConversationOrchestrator,
    gate: AccessGate,
    exports_dir: PathBuf,
    model: String,
    pending: Vec<Attachment>,
}

impl Console {
    pub fn new(orchestrator: ConversationOrchestrator, gate: AccessGate, exports_dir: PathBuf) -> Self {
        let model = orchestrator.catalog().default_model().to_string();
        Self { orchestrator, gate, exports_dir, model, pending: Vec::new() }
    }

    /// Drive the console on the process's stdin/stdout.
    pub async fn run(self, shutdown: CancellationToken) -> Result<ConversationOrchestrator, AppError> {
        let stdin = BufReader::new(tokio::io::stdin());
        self.run_with(stdin, std::io::stdout(), shutdown).await
    }

    /// Drive the console on arbitrary input/output; returns the session when done.
    pub async fn run_with<R, W>(
        mut self,
        input: R,
        mut out: W,
        shutdown: CancellationToken,
    ) -> Result<ConversationOrchestrator, AppError>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let session_id = self.orchestrator.session_id();
        info!(%session_id, model = %self.model, "console session started");
        writeln!(out, "─────────────────────────────────")?;
        writeln!(out, " parley console  (/help, Ctrl-C to quit)")?;
        writeln!(out, "─────────────────────────────────")?;
        if !self.gate.is_unlocked() {
            writeln!(out, "Enter the access secret:")?;
        }

        let mut lines = input.lines();

        loop {
            write!(out, "> ")?;
            out.flush()?;

            let line = tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    writeln!(out, "\n[console] shutdown signal received — closing")?;
                    info!("console shutting down");
                    break;
                }

                line = lines.next_line() => match line {
                    Err(e) => {
                        warn!("console read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        info!("console stdin closed");
                        break;
                    }
                    Ok(Some(line)) => line,
                },
            };

            if !self.gate.is_unlocked() {
                if self.gate.try_unlock(&line) {
                    info!(%session_id, "access gate unlocked");
                    writeln!(out, "✓ Access granted. Model: {}", self.model)?;
                } else {
                    writeln!(out, "✗ Access denied.")?;
                }
                continue;
            }

            match parse_command(&line) {
                Command::Quit => break,
                Command::Help => writeln!(out, "{HELP}")?,
                Command::Models => self.print_models(&mut out)?,
                Command::Model(id) => self.select_model(id, &mut out)?,
                Command::Attach(path) => self.attach(Path::new(path), &mut out).await?,
                Command::History => print_history(self.orchestrator.transcript().turns(), &mut out)?,
                Command::Save(path) => self.save(path, &mut out).await?,
                Command::Unknown(cmd) => writeln!(out, "unknown command: {cmd} (try /help)")?,
                Command::Prompt(prompt) => self.submit(prompt, &mut out).await?,
            }
        }

        Ok(self.orchestrator)
    }

    fn print_models(&self, out: &mut impl Write) -> std::io::Result<()> {
        for m in self.orchestrator.catalog().models() {
            let marker = if m.id == self.model { "*" } else { " " };
            let caps = if m.attachments { "  [attachments]" } else { "" };
            writeln!(out, "{marker} {}{caps}", m.id)?;
        }
        Ok(())
    }

    fn select_model(&mut self, id: &str, out: &mut impl Write) -> std::io::Result<()> {
        if !self.orchestrator.catalog().contains(id) {
            return writeln!(out, "✗ Unknown model '{id}'. See /models.");
        }
        self.model = id.to_string();
        debug!(model = %self.model, "console model switched");
        writeln!(out, "✓ Model: {}", self.model)
    }

    async fn attach(&mut self, path: &Path, out: &mut impl Write) -> std::io::Result<()> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => return writeln!(out, "✗ Cannot read {}: {e}", path.display()),
        };
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        writeln!(out, "✓ Attached {filename} ({} bytes)", bytes.len())?;
        if !self.orchestrator.catalog().supports_attachments(&self.model) {
            writeln!(out, "  note: {} does not accept attachments; it will see the prompt only", self.model)?;
        }
        self.pending.push(Attachment::new(filename, bytes));
        Ok(())
    }

    async fn save(&self, path: Option<&str>, out: &mut impl Write) -> std::io::Result<()> {
        let path = match path {
            Some(p) => PathBuf::from(p),
            None => self.exports_dir.join(format!("{}.md", self.orchestrator.session_id())),
        };
        match export::save(self.orchestrator.transcript().turns(), &path).await {
            Ok(()) => writeln!(out, "✓ Saved to {}", path.display()),
            Err(e) => writeln!(out, "✗ Cannot save to {}: {e}", path.display()),
        }
    }

    async fn submit(&mut self, prompt: &str, out: &mut impl Write) -> std::io::Result<()> {
        let attachments = std::mem::take(&mut self.pending);
        let mut printed = 0usize;

        let result = self
            .orchestrator
            .submit(prompt, &self.model, attachments, &mut |turns: &[Turn]| {
                let Some(last) = turns.last().filter(|t| t.role == Role::Assistant) else {
                    return;
                };
                if let Some(delta) = last.content.get(printed..) {
                    let _ = write!(out, "{delta}");
                    let _ = out.flush();
                    printed = last.content.len();
                }
            })
            .await;

        match result {
            Ok(()) => writeln!(out),
            Err(ValidationError::EmptyPrompt) => writeln!(out, "⚠️ Please provide a valid prompt!"),
            Err(e) => writeln!(out, "⚠️ {e}"),
        }
    }
}

fn print_history(turns: &[Turn], out: &mut impl Write) -> std::io::Result<()> {
    if turns.is_empty() {
        return writeln!(out, "(no messages yet)");
    }
    for t in turns {
        writeln!(out, "[{}] {}", t.role, t.content)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{AttachmentPolicy, AttachmentStore, ModelCatalog};
    use crate::llm::LlmProvider;
    use crate::llm::providers::scripted::{Script, ScriptedProvider};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn console(provider: ScriptedProvider, root: &TempDir, secret: Option<&str>) -> Console {
        let id = Uuid::new_v4();
        let orchestrator = ConversationOrchestrator::new(
            id,
            LlmProvider::Scripted(provider),
            ModelCatalog::from_ids(["model-a", "model-b"]).with_attachments("model-b"),
            AttachmentStore::for_session(root.path(), id, false),
            AttachmentPolicy::Skip,
        );
        Console::new(orchestrator, AccessGate::new(secret.map(str::to_string)), root.path().join("exports"))
    }

    async fn drive(c: Console, input: &str) -> (ConversationOrchestrator, String) {
        let mut out = Vec::new();
        let o = c
            .run_with(input.as_bytes(), &mut out, CancellationToken::new())
            .await
            .unwrap();
        (o, String::from_utf8(out).unwrap())
    }

    #[test]
    fn commands_parse() {
        assert_eq!(parse_command("/help"), Command::Help);
        assert_eq!(parse_command("/model  gpt-4o "), Command::Model("gpt-4o"));
        assert_eq!(parse_command("/model"), Command::Unknown("/model"));
        assert_eq!(parse_command("/attach ./cat.png"), Command::Attach("./cat.png"));
        assert_eq!(parse_command("/save"), Command::Save(None));
        assert_eq!(parse_command("/save out.md"), Command::Save(Some("out.md")));
        assert_eq!(parse_command("/exit"), Command::Quit);
        assert_eq!(parse_command("/frobnicate"), Command::Unknown("/frobnicate"));
        assert_eq!(parse_command("hello /there"), Command::Prompt("hello /there"));
    }

    #[tokio::test]
    async fn prompt_reply_is_printed_and_recorded() {
        let root = TempDir::new().unwrap();
        let provider = ScriptedProvider::new().then(Script::stream(["Hi", " there"]));
        let (o, out) = drive(console(provider, &root, None), "Hello\n").await;

        assert!(out.contains("Hi there\n"));
        assert_eq!(o.transcript().len(), 2);
        assert_eq!(o.transcript().turns()[1].content, "Hi there");
    }

    #[tokio::test]
    async fn whitespace_prompt_shows_validation_message() {
        let root = TempDir::new().unwrap();
        let (o, out) = drive(console(ScriptedProvider::new(), &root, None), "   \n").await;
        assert!(out.contains("Please provide a valid prompt"));
        assert!(o.transcript().is_empty());
    }

    #[tokio::test]
    async fn empty_line_gets_the_same_validation_message() {
        let root = TempDir::new().unwrap();
        let provider = ScriptedProvider::new();
        let (o, out) = drive(console(provider.clone(), &root, None), "\n   \n").await;
        assert_eq!(out.matches("Please provide a valid prompt").count(), 2);
        assert!(o.transcript().is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn gate_blocks_until_secret_matches() {
        let root = TempDir::new().unwrap();
        let provider = ScriptedProvider::new().always(Script::whole("ok"));
        let (o, out) = drive(console(provider.clone(), &root, Some("pw")), "guess\npw\nhello\n").await;

        assert!(out.contains("Access denied"));
        assert!(out.contains("Access granted"));
        assert_eq!(provider.calls().len(), 1);
        assert_eq!(provider.calls()[0].prompt, "hello");
        assert_eq!(o.transcript().len(), 2);
    }

    #[tokio::test]
    async fn model_switch_and_attachment_flow() {
        let root = TempDir::new().unwrap();
        let file = root.path().join("pic.png");
        std::fs::write(&file, [9u8; 4]).unwrap();
        let provider = ScriptedProvider::new().always(Script::whole("seen"));
        let input = format!("/model nope\n/model model-b\n/attach {}\nwhat is it\n", file.display());

        let (_, out) = drive(console(provider.clone(), &root, None), &input).await;

        assert!(out.contains("Unknown model 'nope'"));
        assert!(out.contains("Attached pic.png (4 bytes)"));
        let calls = provider.calls();
        assert_eq!(calls[0].model, "model-b");
        assert_eq!(calls[0].attachments.len(), 1);
    }

    #[tokio::test]
    async fn save_writes_markdown() {
        let root = TempDir::new().unwrap();
        let provider = ScriptedProvider::new().always(Script::whole("pong"));
        let target = root.path().join("chat.md");
        let input = format!("ping\n/save {}\n/quit\nignored\n", target.display());

        let (o, out) = drive(console(provider, &root, None), &input).await;

        assert!(out.contains("Saved to"));
        assert_eq!(o.transcript().len(), 2);
        let saved = export::parse_markdown(&std::fs::read_to_string(&target).unwrap());
        assert_eq!(saved[1].content, "pong");
    }

    #[tokio::test]
    async fn cancelled_token_ends_session() {
        let root = TempDir::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let mut out = Vec::new();
        let o = console(ScriptedProvider::new(), &root, None)
            .run_with("hello\n".as_bytes(), &mut out, token)
            .await
            .unwrap();
        assert!(o.transcript().is_empty());
        assert!(String::from_utf8(out).unwrap().contains("shutdown"));
    }
}
