//! Serial port bring-up for the trigger device
//!
//! At boot the device's USB serial port can appear several seconds after
//! the daemon starts, so opening retries over a bounded window. Failure
//! to open is not fatal: the caller falls back to a silent backend and
//! keeps the pneumatics running.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::time::Duration;

/// Open a serial device, retrying over a bounded window.
///
/// `keep_alive` runs between attempts; the daemon uses it to keep the
/// air-reservoir maintenance going while it waits for the port.
/// Returns `None` when every attempt fails.
pub fn open_port_with_retry(
    path: &Path,
    baud: u32,
    tries: u32,
    retry_delay: Duration,
    mut keep_alive: impl FnMut(),
) -> Option<File> {
    for attempt in 0..tries {
        keep_alive();
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => {
                if let Err(e) = configure_raw(&file, baud) {
                    log::warn!("failed to configure serial port {:?}: {}", path, e);
                }
                log::info!("opened serial port {:?} on attempt {}", path, attempt + 1);
                return Some(file);
            }
            Err(e) => {
                log::debug!("serial open attempt {} failed: {}", attempt + 1, e);
                std::thread::sleep(retry_delay);
            }
        }
    }
    log::warn!("serial port {:?} unavailable after {} attempts", path, tries);
    None
}

/// Put the port in raw 8N1 mode at the requested baud rate.
#[cfg(unix)]
fn configure_raw(file: &File, baud: u32) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let speed = baud_constant(baud);

    // SAFETY: fd is a valid open descriptor for the lifetime of `file`,
    // and termios is plain old data fully initialized by tcgetattr.
    unsafe {
        let mut tty: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut tty) != 0 {
            return Err(std::io::Error::last_os_error());
        }

        libc::cfsetspeed(&mut tty, speed);
        libc::cfmakeraw(&mut tty);
        tty.c_cflag = (tty.c_cflag & !libc::CSIZE) | libc::CS8 | libc::CLOCAL | libc::CREAD;
        tty.c_cflag &= !(libc::PARENB | libc::PARODD | libc::CSTOPB | libc::CRTSCTS);
        // Non-blocking reads with a half-second ceiling
        tty.c_cc[libc::VMIN] = 0;
        tty.c_cc[libc::VTIME] = 5;

        if libc::tcsetattr(fd, libc::TCSANOW, &tty) != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(unix)]
fn baud_constant(baud: u32) -> libc::speed_t {
    match baud {
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        115200 => libc::B115200,
        _ => libc::B57600,
    }
}

#[cfg(not(unix))]
fn configure_raw(_file: &File, _baud: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_window_gives_up() {
        let mut keep_alive_calls = 0;
        let port = open_port_with_retry(
            Path::new("/nonexistent/ttyO1"),
            57600,
            3,
            Duration::from_millis(1),
            || keep_alive_calls += 1,
        );
        assert!(port.is_none());
        assert_eq!(keep_alive_calls, 3);
    }
}
