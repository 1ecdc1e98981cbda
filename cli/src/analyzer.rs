use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;
use tracing::{debug, warn};

use snapcal_core::analysis::{FoodAnalyzer, ImageUpload};

/// Runs an external program per photo.
///
/// The image is written to the program's stdin and its MIME type is exported
/// as `SNAPCAL_IMAGE_MIME`; the program must print the JSON food list on
/// stdout and exit 0. Endpoint and credentials live in its environment.
pub struct CommandAnalyzer {
    program: String,
    args: Vec<String>,
}

impl CommandAnalyzer {
    pub fn new(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .context("Analyzer command is empty")?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl FoodAnalyzer for CommandAnalyzer {
    fn analyze(&self, image: &ImageUpload) -> Result<Value> {
        debug!(
            program = %self.program,
            format = ?image.format(),
            bytes = image.bytes().len(),
            "running analyzer"
        );
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("SNAPCAL_IMAGE_MIME", image.mime_type())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start analyzer '{}'", self.program))?;

        let mut stdin = child.stdin.take().context("Analyzer stdin unavailable")?;
        let bytes = image.bytes().to_vec();
        let writer = std::thread::spawn(move || stdin.write_all(&bytes));

        let output = child
            .wait_with_output()
            .context("Failed to wait for analyzer")?;
        match writer.join() {
            Ok(Ok(())) => {}
            // The program may legitimately stop reading early; its exit status decides.
            Ok(Err(e)) => warn!(error = %e, "analyzer did not consume the whole image"),
            Err(_) => return Err(anyhow!("Analyzer input thread panicked")),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("Analyzer exited with {}: {}", output.status, stderr.trim());
        }

        serde_json::from_slice(&output.stdout).context("Analyzer did not print valid JSON")
    }
}

/// Replays a previously saved analysis response from disk.
pub struct ResponseFileAnalyzer {
    path: PathBuf,
}

impl ResponseFileAnalyzer {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FoodAnalyzer for ResponseFileAnalyzer {
    fn analyze(&self, _image: &ImageUpload) -> Result<Value> {
        let text = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read response file: {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Response file is not valid JSON: {}", self.path.display()))
    }
}
