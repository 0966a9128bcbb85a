//! Recording test double for [`Kernel`] and [`CommandRunner`].
//!
//! Every privileged call is appended to an ordered log as an argument
//! vector, a failure can be injected for any exact call, and a small model
//! of `ip`/`iptables` keeps enough state to check the resulting topology.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::os::fd::{OwnedFd, RawFd};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nsops_common::error::{NsopsError, Result};

use crate::device::{DeviceKind, DeviceSpec};
use crate::exec::{CommandLine, CommandOutput, CommandRunner};
use crate::filesystem::mount::MountRequest;
use crate::kernel::{Kernel, NodeType};
use crate::transfer::MountTreeHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    File,
    Dir,
    Device { kind: DeviceKind, major: u64, minor: u64 },
    Symlink(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Node {
    pub kind: NodeKind,
    pub mode: u32,
    pub owner: Option<(u32, u32)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Link {
    pub netns: Option<String>,
    pub addrs: Vec<String>,
    pub up: bool,
}

#[derive(Debug, Default)]
pub(crate) struct NetState {
    pub links: BTreeMap<String, Link>,
    pub loopback_up: BTreeSet<String>,
    pub forward_rules: Vec<Vec<String>>,
    pub nat_rules: Vec<Vec<String>>,
}

#[derive(Debug)]
pub(crate) struct Harness {
    netns_dir: PathBuf,
    log: RefCell<Vec<Vec<String>>>,
    failure: Option<(Vec<String>, Errno)>,
    nodes: RefCell<BTreeMap<PathBuf, Node>>,
    net: RefCell<NetState>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            netns_dir: PathBuf::from(nsops_common::constants::DEFAULT_NETNS_DIR),
            log: RefCell::default(),
            failure: None,
            nodes: RefCell::default(),
            net: RefCell::default(),
        }
    }

    /// Makes the call whose argument vector equals `call` fail.
    pub fn fail_with(mut self, call: &[&str], errno: Errno) -> Self {
        self.failure = Some((call.iter().map(ToString::to_string).collect(), errno));
        self
    }

    pub fn fail_on(self, call: &[String]) -> Self {
        let call: Vec<&str> = call.iter().map(String::as_str).collect();
        self.fail_with(&call, Errno::EIO)
    }

    pub fn log(&self) -> Vec<Vec<String>> {
        self.log.borrow().clone()
    }

    pub fn node(&self, path: &str) -> Option<Node> {
        self.nodes.borrow().get(Path::new(path)).cloned()
    }

    pub fn insert_node(&self, path: &str, kind: NodeKind) {
        let _ = self.nodes.borrow_mut().insert(
            PathBuf::from(path),
            Node {
                kind,
                mode: 0o600,
                owner: None,
            },
        );
    }

    pub fn net(&self) -> std::cell::Ref<'_, NetState> {
        self.net.borrow()
    }

    fn record(&self, call: Vec<String>) -> std::result::Result<(), Errno> {
        let injected = self
            .failure
            .as_ref()
            .filter(|(expected, _)| *expected == call)
            .map(|(_, errno)| *errno);
        self.log.borrow_mut().push(call);
        injected.map_or(Ok(()), Err)
    }

    fn syscall(&self, call: &'static str, target: &Path, args: Vec<String>) -> Result<()> {
        let mut argv = vec![call.to_owned()];
        argv.extend(args);
        self.record(argv)
            .map_err(|e| NsopsError::syscall(call, target, e))
    }

    fn io(&self, call: &'static str, path: &Path, args: Vec<String>) -> Result<()> {
        let mut argv = vec![call.to_owned()];
        argv.extend(args);
        self.record(argv).map_err(|e| NsopsError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from_raw_os_error(e as i32),
        })
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.borrow().contains_key(path)
    }

    fn dummy_handle() -> MountTreeHandle {
        let file = std::fs::File::open("/dev/null").expect("open /dev/null");
        MountTreeHandle::from(OwnedFd::from(file))
    }

    fn namespace_exists(&self, name: &str) -> bool {
        matches!(
            self.nodes.borrow().get(&self.netns_dir.join(name)),
            Some(Node { kind: NodeKind::Symlink(_), .. })
        )
    }

    fn simulate(&self, command: &CommandLine) -> std::result::Result<(), String> {
        let program = command
            .program()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args: Vec<&str> = command.arguments().iter().map(String::as_str).collect();
        match program.as_str() {
            "ip" => self.simulate_ip(None, &args),
            "iptables" => self.simulate_iptables(&args),
            "fuse-overlayfs" => Ok(()),
            other => Err(format!("{other}: command not found")),
        }
    }

    fn simulate_ip(&self, netns: Option<&str>, args: &[&str]) -> std::result::Result<(), String> {
        let mut net = self.net.borrow_mut();
        let in_ns = |link: &Link| link.netns.as_deref() == netns;
        match args {
            ["netns", "exec", name, inner, rest @ ..]
                if netns.is_none() && inner.rsplit('/').next() == Some("ip") =>
            {
                if !self.namespace_exists(name) {
                    return Err(format!("Cannot open network namespace \"{name}\""));
                }
                drop(net);
                self.simulate_ip(Some(*name), rest)
            }
            ["link", "add", host, "type", "veth", "peer", "name", peer] => {
                if net.links.contains_key(*host) || net.links.contains_key(*peer) {
                    return Err("RTNETLINK answers: File exists".into());
                }
                for name in [host, peer] {
                    let _ = net.links.insert((*name).to_owned(), Link {
                        netns: netns.map(str::to_owned),
                        ..Link::default()
                    });
                }
                Ok(())
            }
            ["link", "set", dev, "netns", name] => {
                if !self.namespace_exists(name) {
                    return Err(format!("Invalid \"netns\" value \"{name}\""));
                }
                let link = net
                    .links
                    .get_mut(*dev)
                    .filter(|l| in_ns(&**l))
                    .ok_or_else(|| format!("Cannot find device \"{dev}\""))?;
                link.netns = Some((*name).to_owned());
                Ok(())
            }
            ["link", "set", "lo", "up"] => {
                let ns = netns.ok_or("lo is always up on the host")?;
                let _ = net.loopback_up.insert(ns.to_owned());
                Ok(())
            }
            ["link", "set", dev, "up"] => {
                let link = net
                    .links
                    .get_mut(*dev)
                    .filter(|l| in_ns(&**l))
                    .ok_or_else(|| format!("Cannot find device \"{dev}\""))?;
                link.up = true;
                Ok(())
            }
            ["addr", "add", addr, "dev", dev] => {
                let link = net
                    .links
                    .get_mut(*dev)
                    .filter(|l| in_ns(&**l))
                    .ok_or_else(|| format!("Cannot find device \"{dev}\""))?;
                link.addrs.push((*addr).to_owned());
                Ok(())
            }
            _ => Err(format!("unsupported ip invocation: {args:?}")),
        }
    }

    fn simulate_iptables(&self, args: &[&str]) -> std::result::Result<(), String> {
        let mut net = self.net.borrow_mut();
        let owned = |rest: &[&str]| rest.iter().map(ToString::to_string).collect::<Vec<_>>();
        match args {
            ["-A", "FORWARD", rest @ ..] => {
                net.forward_rules.push(owned(rest));
                Ok(())
            }
            ["-t", "nat", "-A", "POSTROUTING", rest @ ..] => {
                net.nat_rules.push(owned(rest));
                Ok(())
            }
            _ => Err(format!("unsupported iptables invocation: {args:?}")),
        }
    }
}

impl Kernel for Harness {
    fn mount(&self, request: &MountRequest) -> Result<()> {
        self.syscall(
            "mount",
            &request.target,
            vec![
                request.source.clone().unwrap_or_default(),
                request.target.display().to_string(),
                request.fstype.clone().unwrap_or_default(),
                request.data.clone().unwrap_or_default(),
            ],
        )
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        self.syscall("umount2", target, vec![target.display().to_string()])
    }

    fn open_tree(&self, path: &Path) -> Result<MountTreeHandle> {
        self.syscall("open_tree", path, vec![path.display().to_string()])?;
        Ok(Self::dummy_handle())
    }

    fn attach_tree(&self, handle: MountTreeHandle, target: &Path) -> Result<()> {
        drop(handle);
        self.syscall("move_mount", target, vec![target.display().to_string()])
    }

    fn send_tree(&self, channel: RawFd, handle: MountTreeHandle) -> Result<()> {
        drop(handle);
        self.record(vec!["sendmsg".into(), channel.to_string()])
            .map_err(|e| NsopsError::Transfer {
                operation: "send",
                message: e.to_string(),
            })
    }

    fn receive_tree(&self, channel: RawFd) -> Result<MountTreeHandle> {
        self.record(vec!["recvmsg".into(), channel.to_string()])
            .map_err(|e| NsopsError::Transfer {
                operation: "receive",
                message: e.to_string(),
            })?;
        Ok(Self::dummy_handle())
    }

    fn adopt_tree(&self, fd: RawFd) -> Result<MountTreeHandle> {
        self.record(vec!["adopt".into(), fd.to_string()])
            .map_err(|e| NsopsError::Transfer {
                operation: "adopt",
                message: e.to_string(),
            })?;
        Ok(Self::dummy_handle())
    }

    fn mknod(&self, device: &DeviceSpec) -> Result<()> {
        let kind = match device.kind {
            DeviceKind::Char => "c",
            DeviceKind::Block => "b",
        };
        self.syscall(
            "mknod",
            &device.path,
            vec![
                device.path.display().to_string(),
                kind.into(),
                device.major.to_string(),
                device.minor.to_string(),
            ],
        )?;
        if self.exists(&device.path) {
            return Err(NsopsError::syscall("mknod", &device.path, Errno::EEXIST));
        }
        let _ = self.nodes.borrow_mut().insert(
            device.path.clone(),
            Node {
                kind: NodeKind::Device {
                    kind: device.kind,
                    major: device.major,
                    minor: device.minor,
                },
                mode: device.mode & 0o644,
                owner: None,
            },
        );
        Ok(())
    }

    fn node_type(&self, path: &Path) -> Result<Option<NodeType>> {
        self.io("lstat", path, vec![path.display().to_string()])?;
        Ok(self.nodes.borrow().get(path).map(|node| match node.kind {
            NodeKind::File => NodeType::File,
            NodeKind::Dir => NodeType::Directory,
            NodeKind::Symlink(_) => NodeType::Symlink,
            NodeKind::Device { kind, major, minor } => NodeType::Device { kind, major, minor },
        }))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        self.syscall("chmod", path, vec![format!("{mode:o}"), path.display().to_string()])?;
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| NsopsError::syscall("fchmodat", path, Errno::ENOENT))?;
        if matches!(node.kind, NodeKind::Symlink(_)) {
            return Err(NsopsError::syscall("fchmodat", path, Errno::EOPNOTSUPP));
        }
        node.mode = mode;
        Ok(())
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        self.io("chown", path, vec![format!("{uid}:{gid}"), path.display().to_string()])?;
        let mut nodes = self.nodes.borrow_mut();
        let node = nodes.get_mut(path).ok_or_else(|| NsopsError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        node.owner = Some((uid, gid));
        Ok(())
    }

    fn create_file(&self, path: &Path, mode: u32) -> Result<()> {
        self.io("create", path, vec![path.display().to_string()])?;
        if self.exists(path) {
            return Err(NsopsError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            });
        }
        let _ = self.nodes.borrow_mut().insert(
            path.to_path_buf(),
            Node {
                kind: NodeKind::File,
                mode,
                owner: None,
            },
        );
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        self.io("mkdir", path, vec![path.display().to_string()])?;
        let mut nodes = self.nodes.borrow_mut();
        for dir in path.ancestors().filter(|p| !p.as_os_str().is_empty()) {
            let _ = nodes.entry(dir.to_path_buf()).or_insert(Node {
                kind: NodeKind::Dir,
                mode,
                owner: None,
            });
        }
        Ok(())
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        self.io(
            "symlink",
            link,
            vec![original.display().to_string(), link.display().to_string()],
        )?;
        if self.exists(link) {
            return Err(NsopsError::Io {
                path: link.to_path_buf(),
                source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
            });
        }
        let _ = self.nodes.borrow_mut().insert(
            link.to_path_buf(),
            Node {
                kind: NodeKind::Symlink(original.to_path_buf()),
                mode: 0o777,
                owner: None,
            },
        );
        Ok(())
    }
}

impl CommandRunner for Harness {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        if self.record(command.argv()).is_err() {
            return Ok(CommandOutput {
                output: "injected failure\n".into(),
                exit_code: Some(1),
            });
        }
        Ok(match self.simulate(command) {
            Ok(()) => CommandOutput {
                output: String::new(),
                exit_code: Some(0),
            },
            Err(msg) => CommandOutput {
                output: format!("{msg}\n"),
                exit_code: Some(2),
            },
        })
    }
}
