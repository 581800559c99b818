use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};

use tracing::{debug, warn};

const O_ACCMODE: i64 = 0x3;
const O_WRONLY: i64 = 0x1;
const O_RDWR: i64 = 0x2;
const O_CREAT: i64 = 0x40;
const O_TRUNC: i64 = 0x200;
const O_APPEND: i64 = 0x400;

const STDIN: i64 = 0;
const FIRST_FD: i64 = 3;

/// File descriptors handed out to the running program.
#[derive(Debug)]
pub struct Host {
    files: HashMap<i64, File>,
    next_fd: i64,
}

impl Default for Host {
    fn default() -> Host {
        Host::new()
    }
}

impl Host {
    pub fn new() -> Host {
        Host {
            files: HashMap::new(),
            next_fd: FIRST_FD,
        }
    }

    /// Opens `path` with Linux-style flags. Yields -1 on failure.
    pub fn open(&mut self, path: &[u8], flags: i64) -> i64 {
        let path = String::from_utf8_lossy(path).into_owned();
        let access = flags & O_ACCMODE;

        let mut options = OpenOptions::new();
        options
            .read(access != O_WRONLY)
            .write(access == O_WRONLY || access == O_RDWR)
            .create(flags & O_CREAT != 0)
            .truncate(flags & O_TRUNC != 0)
            .append(flags & O_APPEND != 0);

        match options.open(&path) {
            Ok(file) => {
                let fd = self.next_fd;
                self.next_fd += 1;
                self.files.insert(fd, file);
                debug!(fd, path = %path, "opened");
                fd
            }
            Err(error) => {
                debug!(path = %path, %error, "open failed");
                -1
            }
        }
    }

    /// Reads into `buf`, yielding the byte count or -1.
    pub fn read(&mut self, fd: i64, buf: &mut [u8]) -> i64 {
        let result = match fd {
            STDIN => io::stdin().read(buf),
            _ => match self.files.get_mut(&fd) {
                Some(file) => file.read(buf),
                None => return -1,
            },
        };

        result.map_or(-1, |n| n as i64)
    }

    pub fn close(&mut self, fd: i64) -> i64 {
        match self.files.remove(&fd) {
            Some(_) => 0,
            None => {
                warn!(fd, "close of unknown descriptor");
                -1
            }
        }
    }
}
