pub use octf_ring::QueueAffinity;

/// Best-effort pin of the calling thread to the queue's declared CPU.
/// `QueueAffinity::Any` (the original's `NO_CPU_AFFINITY`) is a no-op.
/// Failing to pin is logged, never fatal -- the worker keeps running
/// unpinned.
pub fn pin_current_thread(affinity: QueueAffinity) {
    if let QueueAffinity::Cpu(cpu) = affinity {
        if let Err(err) = try_pin(cpu) {
            tracing::warn!(cpu, %err, "failed to set worker CPU affinity, continuing unpinned");
        }
    }
}

#[cfg(target_os = "linux")]
fn try_pin(cpu: usize) -> Result<(), std::io::Error> {
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(cpu, &mut set);
        let rc = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
        if rc != 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn try_pin(_cpu: usize) -> Result<(), std::io::Error> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "CPU affinity is only implemented on Linux",
    ))
}
