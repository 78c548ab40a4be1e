//! Subcommands of the `hadron` binary.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use serde::Serialize;

use hadron_fs::{FileSystem, OpenFlags, OpenParams};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory as JSON records
    Ls { path: String },

    /// Show one path's metadata as JSON
    Stat { path: String },

    /// Write a file to stdout
    Cat { path: String },

    /// Upload a local file
    Put {
        local: PathBuf,
        path: String,
        #[arg(long, default_value_t = 0)]
        replication: u16,
        #[arg(long, default_value_t = 0)]
        block_size: u64,
    },

    /// Download a file to local disk
    Get { path: String, local: PathBuf },

    /// Create a directory and its parents
    Mkdir { path: String },

    /// Delete a path
    Rm {
        path: String,
        /// Delete directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },

    /// Rename a path
    Mv { from: String, to: String },

    /// Copy a file or directory tree
    Cp { from: String, to: String },

    /// Set permission bits, given in octal
    Chmod { mode: String, path: String },

    /// Set owner and/or group as OWNER[:GROUP] or :GROUP
    Chown { owner: String, path: String },

    /// Set a file's replication factor
    Setrep { replication: u16, path: String },

    /// Hosts holding each block of a byte range
    Hosts {
        path: String,
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Defaults to the whole file
        #[arg(long)]
        length: Option<u64>,
    },

    /// Capacity and usage of the filesystem
    Df,
}

#[derive(Serialize)]
struct Usage {
    uri: String,
    capacity: u64,
    used: u64,
    default_block_size: u64,
}

fn print_json<T: Serialize>(out: &mut impl Write, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Split `OWNER[:GROUP]`; a missing half is returned empty.
fn parse_owner(owner: &str) -> (&str, &str) {
    owner.split_once(':').unwrap_or((owner, ""))
}

fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode, 8).with_context(|| format!("invalid octal mode {mode:?}"))
}

pub fn run(fs: &FileSystem, command: Command, out: &mut impl Write) -> Result<()> {
    match command {
        Command::Ls { path } => print_json(out, &fs.list_directory(&path)?),
        Command::Stat { path } => print_json(out, &fs.get_path_info(&path)?),
        Command::Cat { path } => {
            let mut f = fs.open_file(&path, OpenFlags::RDONLY, OpenParams::default())?;
            io::copy(&mut f, out)?;
            f.close()?;
            Ok(())
        }
        Command::Put {
            local,
            path,
            replication,
            block_size,
        } => {
            let mut src = File::open(&local).with_context(|| format!("opening {}", local.display()))?;
            let params = OpenParams::default()
                .with_replication(replication)
                .with_block_size(block_size);
            let mut f = fs.open_file(&path, OpenFlags::WRONLY | OpenFlags::CREAT, params)?;
            let copied = io::copy(&mut src, &mut f)?;
            f.close()?;
            tracing::info!(%path, bytes = copied, "uploaded");
            Ok(())
        }
        Command::Get { path, local } => {
            let mut f = fs.open_file(&path, OpenFlags::RDONLY, OpenParams::default())?;
            let mut dst = File::create(&local).with_context(|| format!("creating {}", local.display()))?;
            io::copy(&mut f, &mut dst)?;
            f.close()?;
            Ok(())
        }
        Command::Mkdir { path } => {
            fs.create_directory(&path)?;
            Ok(())
        }
        Command::Rm { path, recursive } => {
            if !fs.delete(&path, recursive)? {
                bail!("{path}: no such file or directory");
            }
            Ok(())
        }
        Command::Mv { from, to } => {
            if !fs.rename(&from, &to)? {
                bail!("cannot rename {from} to {to}");
            }
            Ok(())
        }
        Command::Cp { from, to } => {
            fs.copy(&from, fs, &to)?;
            Ok(())
        }
        Command::Chmod { mode, path } => {
            fs.chmod(&path, parse_mode(&mode)?)?;
            Ok(())
        }
        Command::Chown { owner, path } => {
            let (user, group) = parse_owner(&owner);
            fs.chown(&path, user, group)?;
            Ok(())
        }
        Command::Setrep { replication, path } => {
            fs.set_replication(&path, replication)?;
            Ok(())
        }
        Command::Hosts { path, start, length } => {
            let length = match length {
                Some(length) => length,
                None => fs.get_path_info(&path)?.size,
            };
            print_json(out, &fs.get_hosts(&path, start, length)?)
        }
        Command::Df => {
            let usage = Usage {
                uri: fs.uri(),
                capacity: fs.get_capacity()?,
                used: fs.get_used()?,
                default_block_size: fs.get_default_block_size()?,
            };
            print_json(out, &usage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hadron_fs::{Configuration, ConnectParams, LocalConnector};
    use tempfile::TempDir;

    fn setup() -> (FileSystem, TempDir) {
        let dir = TempDir::new().unwrap();
        let fs = FileSystem::connect(ConnectParams::local(), Configuration::new(), &LocalConnector::new())
            .unwrap();
        fs.set_working_directory(&dir.path().to_string_lossy()).unwrap();
        (fs, dir)
    }

    fn run_capture(fs: &FileSystem, command: Command) -> String {
        let mut out = Vec::new();
        run(fs, command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_parse_owner() {
        assert_eq!(parse_owner("alice"), ("alice", ""));
        assert_eq!(parse_owner("alice:staff"), ("alice", "staff"));
        assert_eq!(parse_owner(":staff"), ("", "staff"));
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_put_cat_get() {
        let (fs, dir) = setup();
        let local = dir.path().join("local.txt");
        std::fs::write(&local, b"line one\nline two\n").unwrap();

        run_capture(
            &fs,
            Command::Put {
                local: local.clone(),
                path: "remote.txt".into(),
                replication: 0,
                block_size: 0,
            },
        );
        assert_eq!(run_capture(&fs, Command::Cat { path: "remote.txt".into() }), "line one\nline two\n");

        let back = dir.path().join("back.txt");
        run_capture(&fs, Command::Get { path: "remote.txt".into(), local: back.clone() });
        assert_eq!(std::fs::read(back).unwrap(), b"line one\nline two\n");
    }

    #[test]
    fn test_stat_and_ls_emit_json() {
        let (fs, dir) = setup();
        std::fs::create_dir(dir.path().join("d")).unwrap();
        std::fs::write(dir.path().join("d/f"), b"abc").unwrap();

        let stat: serde_json::Value =
            serde_json::from_str(&run_capture(&fs, Command::Stat { path: "d/f".into() })).unwrap();
        assert_eq!(stat["kind"], "file");
        assert_eq!(stat["size"], 3);

        let ls: serde_json::Value =
            serde_json::from_str(&run_capture(&fs, Command::Ls { path: "d".into() })).unwrap();
        assert_eq!(ls.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_mkdir_mv_rm() {
        let (fs, dir) = setup();
        run_capture(&fs, Command::Mkdir { path: "a/b".into() });
        assert!(dir.path().join("a/b").is_dir());

        run_capture(&fs, Command::Mv { from: "a/b".into(), to: "c".into() });
        assert!(dir.path().join("c").is_dir());

        run_capture(&fs, Command::Rm { path: "a".into(), recursive: true });
        assert!(!dir.path().join("a").exists());

        let mut out = Vec::new();
        assert!(run(&fs, Command::Rm { path: "a".into(), recursive: true }, &mut out).is_err());
    }

    #[test]
    fn test_df() {
        let (fs, _dir) = setup();
        let df: serde_json::Value = serde_json::from_str(&run_capture(&fs, Command::Df)).unwrap();
        assert_eq!(df["uri"], "file:///");
        assert!(df["capacity"].as_u64().unwrap() > 0);
    }
}
