/// Classic double-fork-free daemonization: fork once, detach the session,
/// and redirect stdio to `/dev/null`. Must run before the tokio runtime is
/// built — forking a multi-threaded process loses every thread but the one
/// that called `fork()`.
#[cfg(unix)]
pub fn daemonize() -> std::io::Result<()> {
    unsafe {
        match libc::fork() {
            pid if pid < 0 => return Err(std::io::Error::last_os_error()),
            0 => {}
            _ => std::process::exit(0),
        }

        if libc::setsid() < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let devnull = std::ffi::CString::new("/dev/null").expect("no interior nul");
        let fd = libc::open(devnull.as_ptr(), libc::O_RDWR);
        if fd >= 0 {
            libc::dup2(fd, libc::STDIN_FILENO);
            libc::dup2(fd, libc::STDOUT_FILENO);
            libc::dup2(fd, libc::STDERR_FILENO);
            if fd > libc::STDERR_FILENO {
                libc::close(fd);
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn daemonize() -> std::io::Result<()> {
    Err(std::io::Error::new(std::io::ErrorKind::Unsupported, "-d/--daemon is only supported on Unix"))
}
