use std::io;

use tracing::{info, warn};

/// Lifts `RLIMIT_MEMLOCK` so the UMEM and rings can be pinned. Older kernels
/// charge AF_XDP memory against this limit; failure only warns.
pub fn raise_memlock_limit() {
    let limit = libc::rlimit {
        rlim_cur: libc::RLIM_INFINITY,
        rlim_max: libc::RLIM_INFINITY,
    };
    let rc = unsafe { libc::setrlimit(libc::RLIMIT_MEMLOCK, &limit) };
    if rc == 0 {
        info!("RLIMIT_MEMLOCK raised to unlimited");
    } else {
        warn!(
            error = %io::Error::last_os_error(),
            "Failed to raise RLIMIT_MEMLOCK, socket bring-up may fail"
        );
    }
}
