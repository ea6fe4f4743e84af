// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Static lookup tables for trace-record derivation: the ignored-function
//! policy, the `func_name -> io_cat` classification, and the fixed
//! size-bin edges.

/// `func_name`s dropped outright regardless of substring matches: framework
/// and data-loader hook calls that the reference tool never folds into I/O
/// metrics.
pub const IGNORED_FUNCTIONS: &[&str] = &[
    "DLIOBenchmark.__init__",
    "DLIOBenchmark.initialize",
    "FileStorage.__init__",
    "IndexedBinaryMMapReader.__init__",
    "IndexedBinaryMMapReader.load_index",
    "IndexedBinaryMMapReader.next",
    "IndexedBinaryMMapReader.read_index",
    "NPZReader.__init__",
    "NPZReader.next",
    "NPZReader.read_index",
    "PyTorchCheckpointing.__init__",
    "PyTorchCheckpointing.finalize",
    "PyTorchCheckpointing.get_tensor",
    "SCRPyTorchCheckpointing.__init__",
    "SCRPyTorchCheckpointing.finalize",
    "SCRPyTorchCheckpointing.get_tensor",
    "TFCheckpointing.__init__",
    "TFCheckpointing.finalize",
    "TFCheckpointing.get_tensor",
    "TFDataLoader.__init__",
    "TFDataLoader.finalize",
    "TFDataLoader.next",
    "TFDataLoader.read",
    "TFFramework.get_loader",
    "TFFramework.init_loader",
    "TFFramework.is_nativeio_available",
    "TFFramework.trace_object",
    "TFReader.__init__",
    "TFReader.next",
    "TFReader.read_index",
    "TorchDataLoader.__init__",
    "TorchDataLoader.finalize",
    "TorchDataLoader.next",
    "TorchDataLoader.read",
    "TorchDataset.__init__",
    "TorchFramework.get_loader",
    "TorchFramework.init_loader",
    "TorchFramework.is_nativeio_available",
    "TorchFramework.trace_object",
];

/// A `func_name` containing any of these substrings is dropped.
pub const IGNORED_SUBSTRINGS: &[&str] = &[".save_state", "checkpoint_end_", "checkpoint_start_"];

pub fn is_ignored(func_name: &str) -> bool {
    IGNORED_FUNCTIONS.contains(&func_name)
        || IGNORED_SUBSTRINGS.iter().any(|s| func_name.contains(s))
}

const METADATA_FUNCS: &[&str] = &[
    "open", "open64", "openat", "close", "stat", "stat64", "lstat", "fstat", "fstat64", "fstatat",
    "seek", "lseek", "lseek64", "fcntl", "fcntl64", "mkdir", "rmdir", "unlink", "unlinkat",
    "rename", "renameat", "access", "chmod", "chown", "truncate", "ftruncate", "readdir",
    "opendir", "closedir", "dup", "dup2",
];

const READ_FUNCS: &[&str] = &["read", "read64", "pread", "pread64", "readv", "preadv", "fread"];

const WRITE_FUNCS: &[&str] = &[
    "write", "write64", "pwrite", "pwrite64", "writev", "pwritev", "fwrite",
];

const SYNC_FUNCS: &[&str] = &["fsync", "fdatasync", "msync", "sync"];

const PCTL_FUNCS: &[&str] = &["fork", "vfork", "exec", "execve", "exit", "wait", "waitpid", "kill", "pipe"];

/// Returns the `io_cat` classification for a `func_name`, one of
/// `read`/`write`/`metadata`/`sync`/`pctl`/`ipc`/`other`.
pub fn io_cat(func_name: &str) -> &'static str {
    if METADATA_FUNCS.contains(&func_name) {
        "metadata"
    } else if READ_FUNCS.contains(&func_name) {
        "read"
    } else if WRITE_FUNCS.contains(&func_name) {
        "write"
    } else if SYNC_FUNCS.contains(&func_name) {
        "sync"
    } else if PCTL_FUNCS.contains(&func_name) {
        "pctl"
    } else if func_name.starts_with("msg") || func_name.starts_with("sem") || func_name.starts_with("shm") {
        "ipc"
    } else {
        "other"
    }
}

/// Bin edges in bytes; `SIZE_BIN_NAMES[i]` covers `[edges[i], edges[i+1])`
/// before the one-bin-earlier shift described in the spec.
pub const SIZE_BIN_EDGES: [f64; 13] = [
    0.0,
    4.0 * 1024.0,
    16.0 * 1024.0,
    64.0 * 1024.0,
    256.0 * 1024.0,
    1024.0 * 1024.0,
    4.0 * 1024.0 * 1024.0,
    16.0 * 1024.0 * 1024.0,
    64.0 * 1024.0 * 1024.0,
    256.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0,
    4.0 * 1024.0 * 1024.0 * 1024.0,
    f64::INFINITY,
];

pub const SIZE_BIN_NAMES: [&str; 12] = [
    "0_4kb", "4_16kb", "16_64kb", "64_256kb", "256kb_1mb", "1_4mb", "4_16mb", "16_64mb",
    "64_256mb", "256mb_1gb", "1_4gb", "4gb_plus",
];

/// Returns the bin name `size` falls into, or `None` for `size <= 0`.
/// Bin `i` covers `edges[i] <= s < edges[i+1]`; the reference tool then
/// shifts the hit one bin earlier (bin 0 absorbs everything below 4 KiB
/// together with the would-be "negative infinity" bin).
pub fn size_bin(size: f64) -> Option<&'static str> {
    if size <= 0.0 {
        return None;
    }
    for i in 0..SIZE_BIN_EDGES.len() - 1 {
        if size >= SIZE_BIN_EDGES[i] && size < SIZE_BIN_EDGES[i + 1] {
            let shifted = i.saturating_sub(1);
            return Some(SIZE_BIN_NAMES[shifted]);
        }
    }
    Some(SIZE_BIN_NAMES[SIZE_BIN_NAMES.len() - 1])
}
