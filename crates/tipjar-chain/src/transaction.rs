//! Legacy Solana wire transactions.
//!
//! Only what the relay needs: encode an unsigned single-transfer
//! transaction, and read the signature table back out of a signed one.
//!
//! ```text
//! transaction = compact_u16(n) || n × [u8; 64] || message
//! message     = header(3) || compact_u16(k) || k × [u8; 32] || blockhash(32)
//!               || compact_u16(i) || instructions
//! ```

use tipjar_crypto::WalletAddress;

use crate::types::{ChainError, ChainResult};

pub const SIGNATURE_LEN: usize = 64;

/// The System Program lives at the all-zero address.
pub const SYSTEM_PROGRAM: WalletAddress = WalletAddress::new([0u8; 32]);

/// System Program instruction index for `Transfer { lamports }`.
const SYSTEM_TRANSFER: u32 = 2;

/// Encode a transfer of `lamports` from `from` to `to` with one empty
/// signature slot for `from` to fill in.
pub fn encode_unsigned_transfer(
    from: &WalletAddress,
    to: &WalletAddress,
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Vec<u8> {
    let mut message = Vec::with_capacity(160);

    // header: 1 required signature, 0 readonly signed, 1 readonly unsigned (program)
    message.extend_from_slice(&[1, 0, 1]);

    encode_compact_u16(&mut message, 3);
    message.extend_from_slice(from.as_bytes());
    message.extend_from_slice(to.as_bytes());
    message.extend_from_slice(SYSTEM_PROGRAM.as_bytes());

    message.extend_from_slice(recent_blockhash);

    encode_compact_u16(&mut message, 1);
    message.push(2); // program id index
    encode_compact_u16(&mut message, 2);
    message.extend_from_slice(&[0, 1]);
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    encode_compact_u16(&mut message, data.len() as u16);
    message.extend_from_slice(&data);

    let mut tx = Vec::with_capacity(1 + SIGNATURE_LEN + message.len());
    encode_compact_u16(&mut tx, 1);
    tx.extend_from_slice(&[0u8; SIGNATURE_LEN]);
    tx.extend_from_slice(&message);
    tx
}

/// The message bytes a wallet signs, i.e. everything after the signature table.
pub fn message_bytes(tx: &[u8]) -> ChainResult<&[u8]> {
    let (count, offset) = decode_compact_u16(tx)?;
    let start = offset + count as usize * SIGNATURE_LEN;
    tx.get(start..)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ChainError::InvalidTransaction("truncated signature table".into()))
}

/// Base58 of the first (fee payer) signature, which is also the
/// transaction id. Fails if the transaction is malformed or unsigned.
pub fn first_signature(tx: &[u8]) -> ChainResult<String> {
    let (count, offset) = decode_compact_u16(tx)?;
    if count == 0 {
        return Err(ChainError::InvalidTransaction("no signatures".into()));
    }
    message_bytes(tx)?;

    let sig = &tx[offset..offset + SIGNATURE_LEN];
    if sig.iter().all(|b| *b == 0) {
        return Err(ChainError::InvalidTransaction("transaction is not signed".into()));
    }
    Ok(bs58::encode(sig).into_string())
}

fn encode_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn decode_compact_u16(bytes: &[u8]) -> ChainResult<(u16, usize)> {
    let mut value: u32 = 0;
    for (i, byte) in bytes.iter().take(3).enumerate() {
        value |= ((byte & 0x7f) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return u16::try_from(value)
                .map(|v| (v, i + 1))
                .map_err(|_| ChainError::InvalidTransaction("compact-u16 overflow".into()));
        }
    }
    Err(ChainError::InvalidTransaction("truncated compact-u16".into()))
}
