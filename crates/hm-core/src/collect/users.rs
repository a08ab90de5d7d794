//! Owner name resolution through the system user database.
//!
//! Uses `getpwuid_r` so that NSS sources (LDAP, SSSD) are honored, which a
//! plain `/etc/passwd` read would miss on cluster nodes.

use std::collections::HashMap;
use std::ffi::CStr;
use tracing::trace;

/// Largest buffer we are willing to grow to for a single passwd entry.
const MAX_PWBUF: usize = 1 << 20;

/// Maps numeric uids to user names.
pub trait OwnerResolver {
    /// Resolve `uid`; unresolvable uids come back as their decimal text.
    fn owner_name(&mut self, uid: u32) -> String;
}

/// Resolver backed by the system user database, cached per uid.
#[derive(Debug, Default)]
pub struct SystemUsers {
    cache: HashMap<u32, String>,
}

impl SystemUsers {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OwnerResolver for SystemUsers {
    fn owner_name(&mut self, uid: u32) -> String {
        self.cache
            .entry(uid)
            .or_insert_with(|| {
                lookup_user_name(uid).unwrap_or_else(|| {
                    trace!(uid, "uid has no passwd entry");
                    uid.to_string()
                })
            })
            .clone()
    }
}

impl OwnerResolver for HashMap<u32, String> {
    fn owner_name(&mut self, uid: u32) -> String {
        self.get(&uid).cloned().unwrap_or_else(|| uid.to_string())
    }
}

/// Look up the user name for `uid` with `getpwuid_r`.
pub fn lookup_user_name(uid: u32) -> Option<String> {
    let suggested = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    let mut buf_len = if suggested > 0 { suggested as usize } else { 1024 };

    loop {
        let mut buf: Vec<libc::c_char> = vec![0; buf_len];
        let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
        let mut result: *mut libc::passwd = std::ptr::null_mut();

        let rc = unsafe {
            libc::getpwuid_r(
                uid as libc::uid_t,
                &mut pwd,
                buf.as_mut_ptr(),
                buf.len(),
                &mut result,
            )
        };

        if rc == libc::ERANGE && buf_len < MAX_PWBUF {
            buf_len *= 2;
            continue;
        }
        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            return None;
        }

        // pw_name points into `buf`, which is still alive here.
        let name = unsafe { CStr::from_ptr(pwd.pw_name) };
        return Some(name.to_string_lossy().into_owned());
    }
}

/// Name of the account that invoked this program.
///
/// Prefers the login name (so `sudo hpcmail` still excludes the operator's
/// own account), then the real uid's name, then `$USER`.
pub fn invoking_user() -> Option<String> {
    login_name()
        .or_else(|| lookup_user_name(unsafe { libc::getuid() }))
        .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
}

// `libc` does not bind the POSIX `getlogin_r`; declare it directly.
extern "C" {
    fn getlogin_r(buf: *mut libc::c_char, bufsize: libc::size_t) -> libc::c_int;
}

fn login_name() -> Option<String> {
    let mut buf: Vec<libc::c_char> = vec![0; 256];
    let rc = unsafe { getlogin_r(buf.as_mut_ptr(), buf.len()) };
    if rc != 0 {
        return None;
    }
    let name = unsafe { CStr::from_ptr(buf.as_ptr()) };
    let name = name.to_string_lossy().into_owned();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
