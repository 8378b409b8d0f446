use std::ffi::{CStr, OsStr};
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use log::{debug, trace};

use crate::config::COMPILER_SUFFIXES;
use crate::vector::RawVec;

const SHEBANG: &[u8; 2] = b"#!";

/// Returns true if `path` is a real compiler binary that can be run through
/// `ccache`. Scripts, links back to `ccache` itself and invocations ccache
/// cannot handle (`-save-temps`) are left alone.
pub fn classify(path: &CStr, argv: RawVec<'_>, ccache: &CStr) -> bool {
    if !has_compiler_suffix(path.to_bytes()) {
        return false;
    }

    let path = Path::new(OsStr::from_bytes(path.to_bytes()));

    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) => {
            trace!("cannot stat {}: {}", path.display(), e);
            return false;
        }
    };

    if is_script(path) {
        debug!("{} is a script", path.display());
        return false;
    }

    if meta.file_type().is_symlink() {
        if let Ok(target) = fs::canonicalize(path) {
            if is_wrapper(&target, ccache) {
                debug!("{} links to the wrapper {}", path.display(), target.display());
                return false;
            }
        }
    }

    if let Some(arg) = argv.iter().find(|a| wants_temps(a.to_bytes())) {
        debug!("{} not wrapped because of {:?}", path.display(), arg);
        return false;
    }

    true
}

// only the final path component is considered
fn has_compiler_suffix(path: &[u8]) -> bool {
    let name = match path.iter().rposition(|&b| b == b'/') {
        Some(i) => &path[i + 1..],
        None => path,
    };
    COMPILER_SUFFIXES.iter().any(|s| name.ends_with(s))
}

// unreadable files count as scripts
fn is_script(path: &Path) -> bool {
    let Ok(mut file) = File::open(path) else {
        return true;
    };
    let mut magic = [0u8; 2];
    match file.read_exact(&mut magic) {
        Ok(()) => &magic == SHEBANG,
        Err(_) => false,
    }
}

fn is_wrapper(target: &Path, ccache: &CStr) -> bool {
    let ccache = Path::new(OsStr::from_bytes(ccache.to_bytes()));

    if target.file_name().is_some() && target.file_name() == ccache.file_name() {
        return true;
    }

    fs::canonicalize(ccache)
        .map(|c: PathBuf| c.as_path() == target)
        .unwrap_or(false)
}

// -save-temps, --save-temps, -save-temps=obj ...
fn wants_temps(arg: &[u8]) -> bool {
    let Some(flag) = arg.strip_prefix(b"-") else {
        return false;
    };
    let flag = flag.strip_prefix(b"-").unwrap_or(flag);
    let name = flag.split(|&b| b == b'=').next().unwrap_or(flag);
    name == b"save-temps"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::tests::OwnedVec;
    use std::ffi::CString;
    use std::os::unix::fs::{symlink, PermissionsExt};

    const ELF: &[u8] = b"\x7fELF\x02\x01\x01\x00";

    fn exe(path: &Path, content: &[u8]) -> CString {
        fs::write(path, content).unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        cpath(path)
    }

    fn cpath(p: &Path) -> CString {
        CString::new(p.as_os_str().as_bytes()).unwrap()
    }

    #[test]
    fn suffixes() {
        assert!(has_compiler_suffix(b"/usr/bin/gcc"));
        assert!(has_compiler_suffix(b"/usr/bin/x86_64-linux-gnu-gcc"));
        assert!(has_compiler_suffix(b"g++"));
        assert!(has_compiler_suffix(b"/opt/arm/bin/arm-none-eabi-c++"));
        assert!(!has_compiler_suffix(b"/bin/ls"));
        assert!(!has_compiler_suffix(b"/usr/bin/clang"));
        assert!(!has_compiler_suffix(b"/usr/bin/gcc/"));
        assert!(!has_compiler_suffix(b"/usr/bin/gcc-ar"));
    }

    #[test]
    fn save_temps_flags() {
        assert!(wants_temps(b"-save-temps"));
        assert!(wants_temps(b"--save-temps"));
        assert!(wants_temps(b"-save-temps=obj"));
        assert!(!wants_temps(b"save-temps"));
        assert!(!wants_temps(b"-fsave-temps"));
        assert!(!wants_temps(b"x.c"));
    }

    #[test]
    fn real_compiler() {
        let tmp = tempfile::tempdir().unwrap();
        let gcc = exe(&tmp.path().join("gcc"), ELF);
        let argv = OwnedVec::new(&["gcc", "-c", "x.c"]);

        assert!(classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
        // same verdict on repeated calls
        assert!(classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn other_programs() {
        let argv = OwnedVec::new(&["ls", "-l"]);
        assert!(!classify(c"/bin/ls", argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn missing_compiler() {
        let tmp = tempfile::tempdir().unwrap();
        let gcc = cpath(&tmp.path().join("gcc"));
        let argv = OwnedVec::new(&["gcc"]);
        assert!(!classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn shebang() {
        let tmp = tempfile::tempdir().unwrap();
        let gcc = exe(&tmp.path().join("gcc"), b"#!/bin/sh\nexec /usr/bin/gcc \"$@\"\n");
        let argv = OwnedVec::new(&["gcc", "-c", "x.c"]);
        for _ in 0..2 {
            assert!(!classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
        }
    }

    #[test]
    fn short_file_is_not_a_script() {
        let tmp = tempfile::tempdir().unwrap();
        let gcc = exe(&tmp.path().join("gcc"), b"#");
        let argv = OwnedVec::new(&["gcc"]);
        assert!(classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn save_temps() {
        let tmp = tempfile::tempdir().unwrap();
        let gcc = exe(&tmp.path().join("gcc"), ELF);
        let argv = OwnedVec::new(&["gcc", "-c", "x.c", "--save-temps"]);
        assert!(!classify(&gcc, argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn symlink_to_compiler() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("gcc-12");
        exe(&real, ELF);
        let link = tmp.path().join("gcc");
        symlink(&real, &link).unwrap();

        let argv = OwnedVec::new(&["gcc"]);
        assert!(classify(&cpath(&link), argv.raw(), c"/usr/bin/ccache"));
    }

    #[test]
    fn symlink_to_wrapper() {
        let tmp = tempfile::tempdir().unwrap();
        let ccache = exe(&tmp.path().join("ccache"), ELF);
        let link = tmp.path().join("gcc");
        symlink(tmp.path().join("ccache"), &link).unwrap();

        let argv = OwnedVec::new(&["gcc", "-c", "x.c"]);
        assert!(!classify(&cpath(&link), argv.raw(), &ccache));

        // configured through an alias, matched by canonical path
        let renamed = tmp.path().join("cc-wrapper");
        fs::rename(tmp.path().join("ccache"), &renamed).unwrap();
        let alias = tmp.path().join("wrapper-alias");
        symlink(&renamed, &alias).unwrap();
        let link2 = tmp.path().join("g++");
        symlink(&renamed, &link2).unwrap();
        assert!(!classify(&cpath(&link2), argv.raw(), &cpath(&alias)));
        assert!(classify(&cpath(&link2), argv.raw(), c"/usr/bin/ccache"));
    }

    // descriptors of this process pointing into `dir`, so tests running in
    // parallel do not disturb the count
    fn open_fds_under(dir: &Path) -> usize {
        fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|e| fs::read_link(e.ok()?.path()).ok())
            .filter(|target| target.starts_with(dir))
            .count()
    }

    #[test]
    fn no_descriptor_left_open() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = fs::canonicalize(tmp.path()).unwrap();

        let gcc = exe(&dir.join("gcc"), ELF);
        let ls = exe(&dir.join("ls"), ELF);
        let script = exe(&dir.join("cross-gcc"), b"#!/bin/sh\n");
        let locked = exe(&dir.join("locked-gcc"), ELF);
        fs::set_permissions(dir.join("locked-gcc"), fs::Permissions::from_mode(0o000)).unwrap();
        let ccache = exe(&dir.join("ccache"), ELF);
        symlink(dir.join("ccache"), dir.join("g++")).unwrap();
        let link = cpath(&dir.join("g++"));
        let missing = cpath(&dir.join("missing-gcc"));

        let plain = OwnedVec::new(&["gcc", "-c", "x.c"]);
        let temps = OwnedVec::new(&["gcc", "-c", "x.c", "--save-temps"]);

        let cases: [(&CStr, &OwnedVec, bool); 7] = [
            (ls.as_c_str(), &plain, false),
            (missing.as_c_str(), &plain, false),
            (script.as_c_str(), &plain, false),
            (link.as_c_str(), &plain, false),
            (gcc.as_c_str(), &temps, false),
            (gcc.as_c_str(), &plain, true),
            // readable anyway when running as root
            (locked.as_c_str(), &plain, unsafe { libc::geteuid() } == 0),
        ];

        assert_eq!(open_fds_under(&dir), 0);
        for (path, argv, expected) in cases {
            assert_eq!(classify(path, argv.raw(), &ccache), expected, "{:?}", path);
            assert_eq!(open_fds_under(&dir), 0, "descriptor leaked by {:?}", path);
        }
    }
}
