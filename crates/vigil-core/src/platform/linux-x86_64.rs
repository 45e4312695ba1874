pub mod file {

    /// O_* macros for fcntl/open are architecture-specific
    pub mod flags {
        pub const O_RDONLY: i32 = 0;
        pub const O_WRONLY: i32 = 1;
        pub const O_RDWR: i32 = 2;
        pub const O_ACCMODE: i32 = 3;
        pub const O_CREAT: i32 = 0x40;
        pub const O_EXCL: i32 = 0x80;
        pub const O_NOCTTY: i32 = 0x100;
        pub const O_TRUNC: i32 = 0x200;
        pub const O_APPEND: i32 = 0x400;
        pub const O_NONBLOCK: i32 = 0x800;
        pub const O_LARGEFILE: i32 = 0x8000;
        pub const O_DIRECTORY: i32 = 0x10000;
    }
}

pub mod syscalls {

    /// Names of the system calls which can be addressed by name in rule files.
    pub const NAMES: &[(&str, u16)] = &[
        ("read", 0),
        ("write", 1),
        ("open", 2),
        ("close", 3),
        ("stat", 4),
        ("lstat", 6),
        ("mmap", 9),
        ("mprotect", 10),
        ("ioctl", 16),
        ("access", 21),
        ("socket", 41),
        ("connect", 42),
        ("accept", 43),
        ("sendto", 44),
        ("recvfrom", 45),
        ("sendmsg", 46),
        ("recvmsg", 47),
        ("bind", 49),
        ("listen", 50),
        ("clone", 56),
        ("fork", 57),
        ("vfork", 58),
        ("execve", 59),
        ("exit", 60),
        ("kill", 62),
        ("truncate", 76),
        ("ftruncate", 77),
        ("rename", 82),
        ("mkdir", 83),
        ("rmdir", 84),
        ("creat", 85),
        ("link", 86),
        ("unlink", 87),
        ("symlink", 88),
        ("chmod", 90),
        ("fchmod", 91),
        ("chown", 92),
        ("fchown", 93),
        ("lchown", 94),
        ("ptrace", 101),
        ("setuid", 105),
        ("setgid", 106),
        ("setreuid", 113),
        ("setregid", 114),
        ("setresuid", 117),
        ("setresgid", 119),
        ("mknod", 133),
        ("chroot", 161),
        ("mount", 165),
        ("umount2", 166),
        ("init_module", 175),
        ("delete_module", 176),
        ("exit_group", 231),
        ("openat", 257),
        ("mkdirat", 258),
        ("unlinkat", 263),
        ("renameat", 264),
        ("linkat", 265),
        ("fchmodat", 268),
        ("renameat2", 316),
        ("execveat", 322),
    ];
}

pub mod socket {
    pub const AF_UNIX: u16 = 1;
    pub const AF_INET: u16 = 2;
    pub const AF_NETLINK: u16 = 16;
    pub const AF_INET6: u16 = 10;

    pub const SOCK_STREAM: u16 = 1;
    pub const SOCK_DGRAM: u16 = 2;
    pub const SOCK_RAW: u16 = 3;
}
