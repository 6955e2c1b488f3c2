//! The concrete, std-backed transport for the ATT fixed channel
//!
//! `Link` owns one open L2CAP channel (CID `0x0004`) and a dedicated reactor thread that drains
//! it: an `epoll` loop over the channel fd plus an `eventfd` used purely to wake the thread for a
//! clean shutdown, with outbound writes serialized through a mutex so any caller thread can
//! submit.
//!
//! Opening the actual `AF_BLUETOOTH`/L2CAP socket is behind [`SocketOpener`] - this module never
//! calls `socket(2)`/`connect(2)` itself. The channel returned by a `SocketOpener` is assumed to
//! preserve message boundaries (a sequenced-packet or datagram socket already scoped to the ATT
//! channel), so one `read`/`write` here is exactly one ATT PDU; `l2cap::AclData`'s length+channel
//! framing is for collaborators that demultiplex several channels off one fd (e.g. an HCI ACL
//! stream) and is not needed on this path.

use crate::error::Error;
use crate::l2cap::ChannelIdentifier;
use nix::sys::epoll::{
    epoll_create1, epoll_ctl, epoll_wait, EpollCreateFlags, EpollEvent, EpollFlags, EpollOp,
};
use nix::sys::eventfd::{eventfd, EfdFlags};
use nix::unistd::{close, read, write};
use std::fmt;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// Address type used to open the channel (Bluetooth Specification v5.0, Vol 3, Part C, 10.8.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Public,
    Random,
}

/// L2CAP security level required of the channel at open time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLevel {
    Low,
    Medium,
    High,
}

/// Which side of the connection this device plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

/// Everything a [`SocketOpener`] needs to open the ATT fixed channel
///
/// Mirrors the socket-opener collaborator record: source/destination address, address type,
/// security level, PSM, the MTU this side is willing to use in each direction, and the local
/// role. Fields this crate has no use for today (L2CAP mode, flushability, priority) are left to
/// the concrete opener to default, since nothing here branches on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    pub source_address: [u8; 6],
    pub destination_address: [u8; 6],
    pub address_type: AddressType,
    pub security_level: SecurityLevel,
    pub psm: u16,
    pub inbound_mtu: u16,
    pub outbound_mtu: u16,
    pub role: Role,
}

/// ATT's well-known PSM
pub const ATT_PSM: u16 = 31;

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            source_address: [0; 6],
            destination_address: [0; 6],
            address_type: AddressType::Public,
            security_level: SecurityLevel::Low,
            psm: ATT_PSM,
            inbound_mtu: 23,
            outbound_mtu: 23,
            role: Role::Master,
        }
    }
}

/// An opened, message-boundary-preserving channel ready for `Link` to drive
pub struct OpenedChannel {
    pub fd: RawFd,
    pub channel_id: ChannelIdentifier,
    /// The MTU negotiated during channel setup - this is what [`Link::mtu`] reports until
    /// `engine::Engine::exchange_mtu` (if ever called) raises it.
    pub negotiated_mtu: u16,
}

/// Opens the ATT fixed channel without this crate ever issuing a `socket`/`connect` syscall
///
/// An embedder implements this against whatever the host platform offers (a BlueZ L2CAP socket,
/// a platform Bluetooth stack's channel API, a test double). This crate's logic doesn't change
/// across platforms, only how the channel is obtained does.
pub trait SocketOpener: Send + Sync {
    fn open(&self, opts: &LinkOptions) -> Result<OpenedChannel, Error>;
}

#[derive(Debug)]
struct FileDescriptor(RawFd);

impl Drop for FileDescriptor {
    fn drop(&mut self) {
        let _ = close(self.0);
    }
}

type ArcFd = Arc<FileDescriptor>;

fn arc_fd(fd: RawFd) -> ArcFd {
    Arc::new(FileDescriptor(fd))
}

/// What woke the reactor thread, per the value attached to the `epoll` registration.
enum WakeReason {
    Channel,
    Exit,
}

impl From<u64> for WakeReason {
    fn from(val: u64) -> Self {
        match val {
            0 => WakeReason::Channel,
            _ => WakeReason::Exit,
        }
    }
}

impl From<WakeReason> for u64 {
    fn from(r: WakeReason) -> Self {
        match r {
            WakeReason::Channel => 0,
            WakeReason::Exit => 1,
        }
    }
}

struct Inner {
    channel_fd: ArcFd,
    exit_fd: ArcFd,
    epoll_fd: ArcFd,
    write_lock: Mutex<()>,
    mtu: AtomicU16,
    closed: AtomicBool,
    on_recv: Mutex<Option<Box<dyn FnMut(&[u8]) + Send>>>,
    on_error: Mutex<Option<Box<dyn Fn(&Error) + Send>>>,
}

impl Inner {
    fn raise_error(&self, err: Error) {
        if let Ok(guard) = self.on_error.lock() {
            if let Some(cb) = guard.as_ref() {
                cb(&err);
            }
        }
    }
}

/// The reactor thread body, spawned once per `Link::connect`: an `epoll_wait` loop that reads on
/// the channel fd and exits on the eventfd.
struct Reactor {
    inner: Arc<Inner>,
}

impl Reactor {
    fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.task())
    }

    fn ignore_eagain_and_eintr<F, R>(mut func: F) -> nix::Result<R>
    where
        F: FnMut() -> nix::Result<R>,
    {
        use nix::errno::Errno;

        loop {
            match func() {
                Err(nix::Error::Sys(Errno::EAGAIN)) | Err(nix::Error::Sys(Errno::EINTR)) => continue,
                other => break other,
            }
        }
    }

    fn task(self) {
        let mut buffer = [0u8; 65535];

        'reactor: loop {
            let events = &mut [EpollEvent::empty(); 8];

            let count = match Self::ignore_eagain_and_eintr(|| {
                epoll_wait(self.inner.epoll_fd.0, events, -1)
            }) {
                Ok(n) => n,
                Err(e) => {
                    self.inner.raise_error(Error::Io(format!("epoll_wait failed: {}", e)));
                    break 'reactor;
                }
            };

            for event in events[..count].iter() {
                match WakeReason::from(event.data()) {
                    WakeReason::Channel => {
                        let len = match Self::ignore_eagain_and_eintr(|| {
                            read(self.inner.channel_fd.0, &mut buffer)
                        }) {
                            Ok(0) => {
                                self.inner.raise_error(Error::Io("channel closed by peer".to_string()));
                                break 'reactor;
                            }
                            Ok(n) => n,
                            Err(e) => {
                                self.inner.raise_error(Error::Io(format!("channel read failed: {}", e)));
                                break 'reactor;
                            }
                        };

                        if let Ok(mut guard) = self.inner.on_recv.lock() {
                            if let Some(cb) = guard.as_mut() {
                                cb(&buffer[..len]);
                            }
                        }
                    }
                    WakeReason::Exit => {
                        let _ = read(self.inner.exit_fd.0, &mut [0u8; 8]);
                        break 'reactor;
                    }
                }
            }
        }
    }
}

/// The single ATT transport this engine drives
///
/// One `Link` owns exactly one open channel and exactly one reactor thread for its lifetime;
/// opening a second `Link` on the same channel is outside this crate's concern (the
/// `SocketOpener` decides what "already open" means).
pub struct Link {
    inner: Arc<Inner>,
    join_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Link").field("mtu", &self.mtu()).finish()
    }
}

impl Link {
    /// Opens the channel through `opener` and starts the reactor thread
    pub fn connect(opener: &dyn SocketOpener, opts: &LinkOptions) -> Result<Link, Error> {
        let opened = opener.open(opts)?;

        let exit_raw = eventfd(0, EfdFlags::EFD_CLOEXEC).map_err(|e| {
            Error::Io(format!("eventfd failed: {}", e))
        })?;

        let epoll_raw = epoll_create1(EpollCreateFlags::EPOLL_CLOEXEC).map_err(|e| {
            Error::Io(format!("epoll_create1 failed: {}", e))
        })?;

        epoll_ctl(
            epoll_raw,
            EpollOp::EpollCtlAdd,
            opened.fd,
            &mut EpollEvent::new(EpollFlags::EPOLLIN, WakeReason::Channel.into()),
        )
        .map_err(|e| Error::Io(format!("epoll_ctl add channel failed: {}", e)))?;

        epoll_ctl(
            epoll_raw,
            EpollOp::EpollCtlAdd,
            exit_raw,
            &mut EpollEvent::new(EpollFlags::EPOLLIN, WakeReason::Exit.into()),
        )
        .map_err(|e| Error::Io(format!("epoll_ctl add exit failed: {}", e)))?;

        let inner = Arc::new(Inner {
            channel_fd: arc_fd(opened.fd),
            exit_fd: arc_fd(exit_raw),
            epoll_fd: arc_fd(epoll_raw),
            write_lock: Mutex::new(()),
            mtu: AtomicU16::new(opened.negotiated_mtu),
            closed: AtomicBool::new(false),
            on_recv: Mutex::new(None),
            on_error: Mutex::new(None),
        });

        let handle = Reactor { inner: inner.clone() }.spawn();

        log::info!("(link) channel {:?} open, mtu {}", opened.channel_id, opened.negotiated_mtu);

        Ok(Link { inner, join_handle: Mutex::new(Some(handle)) })
    }

    /// Sends exactly one PDU. Writes from different threads are serialized; this never
    /// interleaves two submits into one datagram.
    pub fn submit(&self, pdu: &[u8]) -> Result<(), Error> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(Error::Io("link is closed".to_string()));
        }

        let _guard = self.inner.write_lock.lock().expect("link write lock poisoned");

        log::debug!("(link) submit {} bytes, opcode {:#04x}", pdu.len(), pdu.first().copied().unwrap_or(0));

        Reactor::ignore_eagain_and_eintr(|| write(self.inner.channel_fd.0, pdu).map(|_| ()))
            .map_err(|e| Error::Io(format!("channel write failed: {}", e)))
    }

    /// Installs the sole inbound-PDU callback, replacing any previous one
    pub fn set_on_recv<F>(&self, cb: F)
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        *self.inner.on_recv.lock().expect("link recv lock poisoned") = Some(Box::new(cb));
    }

    /// Installs the sole I/O-error callback, replacing any previous one
    pub fn set_on_error<F>(&self, cb: F)
    where
        F: Fn(&Error) + Send + 'static,
    {
        *self.inner.on_error.lock().expect("link error lock poisoned") = Some(Box::new(cb));
    }

    /// The current negotiated ATT MTU
    pub fn mtu(&self) -> u16 {
        self.inner.mtu.load(Ordering::Acquire)
    }

    /// Raises the negotiated MTU, called by `engine::Engine::exchange_mtu` on a successful
    /// handshake. Never lowers the MTU - the ATT MTU only ever increases for the life of a
    /// connection.
    pub(crate) fn set_mtu(&self, mtu: u16) {
        self.inner.mtu.store(mtu, Ordering::Release);
    }

    /// Tears the channel down. Idempotent; subsequent `submit` calls fail.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let _ = write(self.inner.exit_fd.0, &[1u8; 8]);

        if let Some(handle) = self.join_handle.lock().expect("link join lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.close();
    }
}
