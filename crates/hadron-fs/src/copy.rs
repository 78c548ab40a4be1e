//! Copying between two backend connections.
//!
//! The two ends may be different backends; bytes are streamed through the
//! backend stream traits with `io.file.buffer.size` sized reads.

use crate::backend::{BackendError, BackendResult, Connection};
use crate::config::Configuration;
use crate::marshal::RawBuffer;
use crate::path::DfsPath;

/// Copy `src_path` on `src` to `dst_path` on `dst`.
///
/// Directories are copied recursively. When `dst_path` is an existing
/// directory the source lands underneath it under its own name. With
/// `delete_source` the source is removed recursively once the copy has
/// finished.
pub fn copy_between(
    src: &dyn Connection,
    src_path: &DfsPath,
    dst: &dyn Connection,
    dst_path: &DfsPath,
    delete_source: bool,
    conf: &Configuration,
) -> BackendResult<()> {
    let status = src.status(src_path)?;
    let target = if dst.is_directory(dst_path)? {
        dst_path.join(status.path.name())
    } else {
        dst_path.clone()
    };

    // Opening the target would truncate the source before it is read.
    if src.identity() == dst.identity() {
        let from = status.path.absolute_against(&src.working_directory()?);
        let to = target.absolute_against(&dst.working_directory()?);
        if to.starts_with(&from) {
            return Err(BackendError::new(format!(
                "cannot copy {from} onto itself ({to})"
            )));
        }
    }

    let buffer_size = conf.buffer_size().max(1) as usize;
    let replication = conf.replication().clamp(1, u16::MAX as i64) as u16;
    copy_tree(src, &status.path, status.is_dir, dst, &target, buffer_size, replication)?;

    if delete_source {
        tracing::debug!(path = %src_path, "removing copy source");
        src.delete(src_path, true)?;
    }
    Ok(())
}

fn copy_tree(
    src: &dyn Connection,
    src_path: &DfsPath,
    is_dir: bool,
    dst: &dyn Connection,
    dst_path: &DfsPath,
    buffer_size: usize,
    replication: u16,
) -> BackendResult<()> {
    if !is_dir {
        return copy_file(src, src_path, dst, dst_path, buffer_size, replication);
    }

    dst.mkdirs(dst_path)?;
    for child in src.list_status(src_path)? {
        let child_dst = dst_path.join(child.path.name());
        copy_tree(src, &child.path, child.is_dir, dst, &child_dst, buffer_size, replication)?;
    }
    Ok(())
}

fn copy_file(
    src: &dyn Connection,
    src_path: &DfsPath,
    dst: &dyn Connection,
    dst_path: &DfsPath,
    buffer_size: usize,
    replication: u16,
) -> BackendResult<()> {
    let block_size = dst.default_block_size_for(dst_path)?;
    let mut input = src.open(src_path, buffer_size)?;
    let mut output = dst.create(dst_path, true, buffer_size, replication, block_size)?;

    let mut buf = RawBuffer::try_allocate(buffer_size)
        .map_err(|e| BackendError::new(format!("cannot allocate {buffer_size} byte copy buffer: {e}")))?;
    let mut copied = 0u64;
    while let Some(n) = input.read(&mut buf)? {
        if n == 0 {
            break;
        }
        output.write(&buf.as_slice()[..n])?;
        copied += n as u64;
    }
    input.close()?;
    output.close()?;

    tracing::debug!(from = %src_path, to = %dst_path, bytes = copied, "copied file");
    Ok(())
}
