//! Utility functions for privileges, user-owned files and time formatting.

use std::path::Path;

/// Check if the current process is running as root (UID 0)
///
/// Uses the effective user ID from the OS instead of spawning an external command.
#[must_use]
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn is_root() -> bool {
    // SAFETY: geteuid() is a simple syscall that returns the effective user ID.
    // It has no side effects and always succeeds.
    unsafe { libc::geteuid() == 0 }
}

/// Check if the current process is running as root (UID 0)
///
/// On non-Unix platforms, this always returns `false`.
#[must_use]
#[cfg(not(unix))]
pub fn is_root() -> bool {
    false
}

/// Create a directory (and parents) owned by the real user.
///
/// # Errors
///
/// Returns an error if directory creation fails.
pub fn create_user_dir(path: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(path)?;
    crate::config::fix_ownership(path);
    Ok(())
}

/// Write a file owned by the real user.
///
/// # Errors
///
/// Returns an error if the write fails.
pub fn write_user_file(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    std::fs::write(path, contents)?;
    crate::config::fix_ownership(path);
    Ok(())
}

/// Write a file readable and writable only by its owner (`0600`).
///
/// Permissions are applied at creation and re-applied afterwards so that a
/// pre-existing file with wider permissions is tightened as well.
///
/// # Errors
///
/// Returns an error if the write or permission change fails.
#[cfg(unix)]
pub fn write_private_file(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    write_file_with_mode(path, contents.as_ref(), 0o600)
}

#[cfg(not(unix))]
pub fn write_private_file(path: &Path, contents: impl AsRef<[u8]>) -> std::io::Result<()> {
    write_user_file(path, contents)
}

/// Write a file with an explicit Unix mode.
///
/// # Errors
///
/// Returns an error if the write or permission change fails.
#[cfg(unix)]
pub fn write_file_with_mode(path: &Path, contents: &[u8], mode: u32) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))?;
    crate::config::fix_ownership(path);
    Ok(())
}

#[cfg(not(unix))]
pub fn write_file_with_mode(path: &Path, contents: &[u8], _mode: u32) -> std::io::Result<()> {
    write_user_file(path, contents)
}

/// Create a directory only accessible by its owner (`0700`).
///
/// # Errors
///
/// Returns an error if directory creation or permission change fails.
#[cfg(unix)]
pub fn create_private_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    create_user_dir(path)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
}

#[cfg(not(unix))]
pub fn create_private_dir(path: &Path) -> std::io::Result<()> {
    create_user_dir(path)
}

/// Reads one line from stdin, with terminal echo off if stdin is a tty.
///
/// The trailing newline is removed; other whitespace is kept.
///
/// # Errors
///
/// Returns an error if stdin cannot be read or the terminal cannot be configured.
#[cfg(unix)]
#[allow(unsafe_code)]
pub fn read_secret_line(prompt: &str) -> std::io::Result<String> {
    use std::io::Write;

    let fd = libc::STDIN_FILENO;
    // SAFETY: isatty only inspects the descriptor.
    if unsafe { libc::isatty(fd) } != 1 {
        return read_stdin_line();
    }

    eprint!("{prompt}");
    let _ = std::io::stderr().flush();

    let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: fd is a terminal and term points to writable storage for one termios.
    if unsafe { libc::tcgetattr(fd, term.as_mut_ptr()) } != 0 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: tcgetattr succeeded and initialized the struct.
    let original = unsafe { term.assume_init() };
    let mut silent = original;
    silent.c_lflag &= !libc::ECHO;

    // SAFETY: both structs are valid termios values for this terminal.
    unsafe { libc::tcsetattr(fd, libc::TCSANOW, &silent) };
    let line = read_stdin_line();
    // SAFETY: restores the attributes read above.
    unsafe { libc::tcsetattr(fd, libc::TCSANOW, &original) };
    eprintln!();
    line
}

#[cfg(not(unix))]
pub fn read_secret_line(prompt: &str) -> std::io::Result<String> {
    eprint!("{prompt}");
    read_stdin_line()
}

fn read_stdin_line() -> std::io::Result<String> {
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(strip_newline(&line).to_string())
}

fn strip_newline(line: &str) -> &str {
    line.strip_suffix('\n')
        .map_or(line, |l| l.strip_suffix('\r').unwrap_or(l))
}

/// Truncates a string to a maximum number of characters.
///
/// If the string exceeds `max_chars`, it is truncated and "..." is appended.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let mut t: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        t.push_str("...");
        t
    } else {
        s.to_string()
    }
}

/// Converts any `SystemTime` into a local `HH:MM:SS` string.
#[must_use]
pub fn format_system_time_local(time: std::time::SystemTime) -> String {
    local_tm(time).map_or_else(
        || "00:00:00".to_string(),
        |tm| format!("{:02}:{:02}:{:02}", tm.hour, tm.minute, tm.second),
    )
}

/// Converts any `SystemTime` into a local `YYYY-MM-DD` string.
#[must_use]
pub fn format_system_date_local(time: std::time::SystemTime) -> String {
    local_tm(time).map_or_else(
        || "unknown".to_string(),
        |tm| format!("{:04}-{:02}-{:02}", tm.year, tm.month, tm.day),
    )
}

/// Broken-down local time.
struct LocalTm {
    year: i32,
    month: i32,
    day: i32,
    hour: i32,
    minute: i32,
    second: i32,
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn local_tm(time: std::time::SystemTime) -> Option<LocalTm> {
    let secs = time
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .ok()?
        .as_secs();

    // SAFETY: localtime_r writes into our stack-allocated `tm` and is
    // thread-safe (unlike localtime). We pass a valid pointer to both args.
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    #[allow(clippy::cast_possible_wrap)]
    let time_t = secs as libc::time_t;
    let result = unsafe { libc::localtime_r(&time_t, &mut tm) };
    if result.is_null() {
        return None;
    }

    Some(LocalTm {
        year: tm.tm_year + 1900,
        month: tm.tm_mon + 1,
        day: tm.tm_mday,
        hour: tm.tm_hour,
        minute: tm.tm_min,
        second: tm.tm_sec,
    })
}

#[cfg(not(unix))]
fn local_tm(_time: std::time::SystemTime) -> Option<LocalTm> {
    None
}
