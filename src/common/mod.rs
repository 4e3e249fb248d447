pub mod error;

use md5::{Digest, Md5};

/// Hex MD5 digest of arbitrary bytes. Used for descriptor content
/// fingerprints, not for anything security sensitive.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for byte in digest {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Ask the OS for a currently free TCP port on loopback.
///
/// The listener is dropped before returning, so the port is only free at
/// the moment of allocation. Callers bind it immediately; each probe gets
/// a fresh allocation so concurrent probes never share a port.
pub fn alloc_free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_known_value() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn free_port_is_nonzero() {
        let port = alloc_free_port().unwrap();
        assert!(port > 0);
    }

    #[test]
    fn free_ports_are_bindable() {
        let port = alloc_free_port().unwrap();
        std::net::TcpListener::bind(("127.0.0.1", port)).unwrap();
    }
}
