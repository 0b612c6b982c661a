//! Key-printer capability, used only by `write_dot`.

/// Renders a fixed-size key record as a human-readable string for the DOT
/// diagnostic writer. Never consulted by insert/search/remove.
pub trait KeyPrinter {
    fn print(&self, key: &[u8], rec_size: usize) -> String;
}

/// Prints a key as a hex dump of its raw bytes. Always applicable, since it
/// makes no assumption about the key's logical type.
#[derive(Debug, Clone, Copy, Default)]
pub struct HexKeyPrinter;

impl KeyPrinter for HexKeyPrinter {
    fn print(&self, key: &[u8], rec_size: usize) -> String {
        key[..rec_size]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

/// Prints a key as a little-endian signed 64-bit integer, truncating or
/// zero-extending to 8 bytes as needed. Pairs with [`crate::comparator::I64Comparator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct I64KeyPrinter;

impl KeyPrinter for I64KeyPrinter {
    fn print(&self, key: &[u8], rec_size: usize) -> String {
        let mut buf = [0u8; 8];
        let n = rec_size.min(8);
        buf[..n].copy_from_slice(&key[..n]);
        i64::from_le_bytes(buf).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_printer_renders_bytes() {
        assert_eq!(HexKeyPrinter.print(&[0xde, 0xad], 2), "dead");
    }

    #[test]
    fn i64_printer_renders_number() {
        let bytes = 42i64.to_le_bytes();
        assert_eq!(I64KeyPrinter.print(&bytes, 8), "42");
    }
}
