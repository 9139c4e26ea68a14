use std::fs::File;

/// Whether the process still has a controlling terminal. Opening /dev/tty
/// fails with ENXIO once the controlling terminal is gone, which makes the
/// open itself the detection primitive.
pub fn has_controlling_terminal() -> bool {
    File::open("/dev/tty").is_ok()
}
