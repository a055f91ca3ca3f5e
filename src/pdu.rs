//! Modbus PDU data structure.
//!
//! Uses a fixed-size stack array to avoid heap allocation; the SDM120 only
//! ever exchanges small frames but the buffer is sized to the spec limit.

use crate::constants::MAX_PDU_SIZE;
use crate::error::{Result, Sdm120Error};

/// Stack-allocated Modbus PDU (function code + data)
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(Sdm120Error::Protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(Sdm120Error::Protocol("PDU buffer full".to_string()));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)?;
        Ok(())
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(Sdm120Error::Protocol(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// Get immutable data slice
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Get current length
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        if self.len > 0 {
            Some(self.data[0])
        } else {
            None
        }
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & 0x80 != 0)
            .unwrap_or(false)
    }

    /// Get exception code
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    /// Create a new builder
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Set function code
    #[inline]
    pub fn function_code(mut self, fc: u8) -> Result<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Add register address
    #[inline]
    pub fn address(mut self, addr: u16) -> Result<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    /// Add register quantity
    #[inline]
    pub fn quantity(mut self, qty: u16) -> Result<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    /// Add a byte
    #[inline]
    pub fn byte(mut self, b: u8) -> Result<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    /// Add data
    #[inline]
    pub fn data(mut self, data: &[u8]) -> Result<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    /// Build the PDU
    #[inline]
    pub fn build(self) -> ModbusPdu {
        self.pdu
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdu_basic_operations() {
        let mut pdu = ModbusPdu::new();
        assert_eq!(pdu.len(), 0);
        assert!(pdu.is_empty());

        pdu.push(0x03).unwrap();
        assert_eq!(pdu.function_code(), Some(0x03));
        assert!(!pdu.is_exception());

        pdu.push_u16(0x001C).unwrap();
        pdu.push_u16(0x0002).unwrap();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x03, 0x00, 0x1C, 0x00, 0x02]);
    }

    #[test]
    fn test_pdu_builder() {
        let pdu = PduBuilder::new()
            .function_code(0x04)
            .unwrap()
            .address(0x0000)
            .unwrap()
            .quantity(0x0002)
            .unwrap()
            .build();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x04, 0x00, 0x00, 0x00, 0x02]);
    }

    #[test]
    fn test_pdu_builder_write_multiple() {
        let pdu = PduBuilder::new()
            .function_code(0x10)
            .unwrap()
            .address(0x001C)
            .unwrap()
            .quantity(0x0002)
            .unwrap()
            .byte(0x04)
            .unwrap()
            .data(&[0x3F, 0x80, 0x00, 0x00])
            .unwrap()
            .build();

        assert_eq!(pdu.len(), 10);
        assert_eq!(
            pdu.as_slice(),
            &[0x10, 0x00, 0x1C, 0x00, 0x02, 0x04, 0x3F, 0x80, 0x00, 0x00]
        );
    }

    #[test]
    fn test_exception_response() {
        let mut pdu = ModbusPdu::new();
        pdu.push(0x83).unwrap(); // FC 03 + 0x80
        pdu.push(0x02).unwrap();

        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));
    }

    #[test]
    fn test_pdu_overflow() {
        let mut pdu = ModbusPdu::new();
        let large_data = vec![0xFF; MAX_PDU_SIZE + 1];
        assert!(pdu.extend(&large_data).is_err());
    }

    #[test]
    fn test_pdu_from_slice() {
        let data = vec![0x03, 0x00, 0x1C, 0x00, 0x02];
        let pdu = ModbusPdu::from_slice(&data).unwrap();
        assert_eq!(pdu.as_slice(), &data[..]);
        assert_eq!(pdu.function_code(), Some(0x03));

        let too_large = vec![0xFF; MAX_PDU_SIZE + 1];
        assert!(ModbusPdu::from_slice(&too_large).is_err());
    }

    #[test]
    fn test_pdu_push_until_full() {
        let mut pdu = ModbusPdu::new();
        for i in 0..MAX_PDU_SIZE {
            pdu.push(i as u8).unwrap();
        }
        assert!(pdu.push(0xFF).is_err());
    }
}
