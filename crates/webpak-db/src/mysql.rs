//! MySQL / MariaDB adapter driving the `mysqldump` and `mysql` client tools.
//!
//! The password is handed to the clients through `MYSQL_PWD` and never
//! appears on a command line.

use crate::adapter::{DatabaseAdapter, Engine};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use webpak_core::{byte_to_human_readable, is_file, DatabaseConfig, Error, IoResultExt, Result};

const DUMP_TOOL: &str = "mysqldump";
const CLIENT_TOOL: &str = "mysql";

/// Session setting applied before a load, for MySQL/MariaDB compatibility
/// with dumps written under a different strict mode.
const LOAD_INIT_COMMAND: &str = "SET sql_mode=''";

/// Adapter for MySQL-compatible servers.
#[derive(Debug, Clone)]
pub struct MySqlAdapter {
    config: DatabaseConfig,
    dump_tool: Option<PathBuf>,
    client_tool: Option<PathBuf>,
}

impl MySqlAdapter {
    /// Creates an adapter that locates the client tools on `PATH` when first needed.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            dump_tool: None,
            client_tool: None,
        }
    }

    /// Uses explicit client tool binaries instead of searching `PATH`.
    pub fn with_tools(mut self, dump_tool: impl Into<PathBuf>, client_tool: impl Into<PathBuf>) -> Self {
        self.dump_tool = Some(dump_tool.into());
        self.client_tool = Some(client_tool.into());
        self
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn tool(&self, configured: &Option<PathBuf>, name: &str) -> Result<PathBuf> {
        match configured {
            Some(path) => Ok(path.clone()),
            None => which::which(name).map_err(|_| {
                Error::database(format!(
                    "'{}' was not found in PATH; install the MySQL client tools",
                    name
                ))
            }),
        }
    }

    /// Connection arguments shared by both tools.
    pub fn connection_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if !self.config.host.is_empty() {
            args.push(format!("--host={}", self.config.host));
            args.push("--protocol=TCP".to_string());
        }
        if let Some(port) = &self.config.port {
            args.push(format!("--port={}", port));
        }
        args.push(format!("--user={}", self.config.username));
        args
    }

    /// Arguments for a consistent, read-only `mysqldump` of the configured database.
    pub fn dump_args(&self) -> Vec<String> {
        let mut args = self.connection_args();
        // REPEATABLE READ snapshot that is never committed
        args.push("--single-transaction".to_string());
        // stream rows instead of buffering whole tables
        args.push("--quick".to_string());
        args.push("--no-tablespaces".to_string());
        args.push(self.config.name.clone());
        args
    }

    /// Statements that (re)create the configured database.
    pub fn create_statements(&self, drop_first: bool) -> String {
        let name = quote_identifier(&self.config.name);
        let create = format!("CREATE DATABASE IF NOT EXISTS {};", name);
        if drop_first {
            format!("DROP DATABASE IF EXISTS {}; {}", name, create)
        } else {
            create
        }
    }

    pub fn load_args(&self) -> Vec<String> {
        let mut args = self.connection_args();
        args.push(format!("--init-command={}", LOAD_INIT_COMMAND));
        args.push(self.config.name.clone());
        args
    }

    fn command(&self, tool: &Path, args: &[String]) -> Command {
        let mut cmd = Command::new(tool);
        cmd.args(args);
        if self.config.password.is_empty() {
            cmd.env_remove("MYSQL_PWD");
        } else {
            cmd.env("MYSQL_PWD", &self.config.password);
        }
        cmd
    }

    fn write_dump(&self, tool: &Path, output_gz: &Path) -> Result<u64> {
        let mut child = self
            .command(tool, &self.dump_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_path("failed to run", tool)?;
        let stderr = collect_stderr(&mut child);

        let copied = (|| -> io::Result<u64> {
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| io::Error::other("dump output is not captured"))?;
            let file = File::create(output_gz)?;
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            let bytes = io::copy(&mut BufReader::new(stdout), &mut encoder)?;
            encoder.finish()?.flush()?;
            Ok(bytes)
        })();

        // the consumer is drained before the producer is reaped
        if copied.is_err() {
            let _ = child.kill();
        }
        let status = child.wait().with_path("failed to wait for", tool)?;
        let stderr = join_stderr(stderr);

        // a killed dump reports the write failure, not the signal
        let bytes = copied.with_path("failed to write", output_gz)?;
        if !status.success() {
            return Err(Error::database(format!(
                "{} failed ({}): {}",
                DUMP_TOOL,
                status,
                stderr.trim()
            )));
        }
        Ok(bytes)
    }

    fn run_client<R: Read>(&self, args: &[String], input: Option<R>) -> Result<()> {
        let tool = self.tool(&self.client_tool, CLIENT_TOOL)?;
        let mut child = self
            .command(&tool, args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .with_path("failed to run", &tool)?;
        let stderr = collect_stderr(&mut child);

        let fed = match (input, child.stdin.take()) {
            (Some(mut input), Some(stdin)) => {
                let mut stdin = BufWriter::new(stdin);
                // stdin is closed when the writer drops so the client sees EOF
                io::copy(&mut input, &mut stdin).and_then(|bytes| stdin.flush().map(|_| bytes))
            }
            _ => Ok(0),
        };

        let status = child.wait().with_path("failed to wait for", &tool)?;
        let stderr = join_stderr(stderr);

        if !status.success() {
            return Err(Error::database(format!(
                "{} failed ({}): {}",
                CLIENT_TOOL,
                status,
                stderr.trim()
            )));
        }
        let bytes = fed.map_err(|e| Error::io(format!("failed to feed {}", CLIENT_TOOL), e))?;
        debug!("Sent {} bytes to {}", bytes, CLIENT_TOOL);
        Ok(())
    }
}

impl DatabaseAdapter for MySqlAdapter {
    fn engine(&self) -> Engine {
        Engine::MySql
    }

    fn dump(&self, output_gz: &Path) -> Result<u64> {
        let tool = self.tool(&self.dump_tool, DUMP_TOOL)?;
        info!(
            "Dumping database '{}' to '{}'",
            self.config.name,
            output_gz.display()
        );

        match self.write_dump(&tool, output_gz) {
            Ok(bytes) => {
                let written = fs::metadata(output_gz).map(|m| m.len()).unwrap_or(0);
                info!(
                    "Wrote '{}' ({})",
                    output_gz.display(),
                    byte_to_human_readable(written)
                );
                Ok(bytes)
            }
            Err(e) => {
                if output_gz.exists() {
                    debug!("Removing partial dump '{}'", output_gz.display());
                    let _ = fs::remove_file(output_gz);
                }
                Err(e)
            }
        }
    }

    fn create_database(&self, drop_first: bool) -> Result<()> {
        if drop_first {
            info!("Dropping database '{}'", self.config.name);
            info!("Creating database '{}'", self.config.name);
        } else {
            info!("Creating database '{}' (if not exists)", self.config.name);
        }

        let mut args = self.connection_args();
        args.push(format!("--execute={}", self.create_statements(drop_first)));
        self.run_client(&args, None::<io::Empty>)
    }

    fn load_from_compressed_file(&self, input_gz: &Path) -> Result<()> {
        if !is_file(input_gz) {
            return Err(Error::not_found(input_gz));
        }

        info!("Importing database to '{}'", self.config.name);
        let file = File::open(input_gz).with_path("failed to open", input_gz)?;
        self.run_client(&self.load_args(), Some(GzDecoder::new(BufReader::new(file))))?;
        info!(
            "Imported '{}' to '{}'",
            input_gz.display(),
            self.config.name
        );
        Ok(())
    }
}

/// Back-quotes an identifier, doubling embedded back-quotes.
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Drains the child's stderr on a separate thread so a full pipe never blocks it.
fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut output = String::new();
        let _ = stderr.read_to_string(&mut output);
        output
    }))
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}
