//! Turns signed application payloads into self-authenticating,
//! network-scoped datagrams, and reverses the process on receive.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};

use crate::constants::{HEADER_KEY_INFO, NONCE_SIZE, PACKET_PREFIX, TAG_SIZE};
use crate::envelope::replay::ReplayGuard;
use crate::error::{MeshError, Result};
use crate::identity::keypair::IdentityKeypair;
use crate::types::envelope_header::EnvelopeHeader;
use crate::types::mesh_message::MeshMessage;
use crate::types::peer_id::PeerId;

/// Minimum possible packet length: prefix + nonce + header tag + header
/// length + an empty header + payload length + an empty payload tag.
/// In practice the header is never empty, but this is the floor below
/// which a packet can be rejected before touching any crypto.
const MIN_PACKET_LEN: usize = PACKET_PREFIX.len() + NONCE_SIZE + TAG_SIZE + 2 + 4 + TAG_SIZE;

pub fn network_hash(network_key: &[u8; 32]) -> [u8; 8] {
    let digest = Sha256::digest(network_key);
    let mut hash = [0u8; 8];
    hash.copy_from_slice(&digest[..8]);
    hash
}

fn header_key(network_key: &[u8; 32]) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, network_key);
    let mut okm = [0u8; 32];
    hk.expand(HEADER_KEY_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

fn payload_nonce(header_nonce: &[u8; NONCE_SIZE]) -> [u8; NONCE_SIZE] {
    let mut nonce = *header_nonce;
    nonce[NONCE_SIZE - 1] ^= 0x01;
    nonce
}

fn seal(key: &[u8; 32], nonce: &[u8; NONCE_SIZE], plaintext: &[u8]) -> (Vec<u8>, [u8; TAG_SIZE]) {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .expect("chacha20poly1305 encryption does not fail for bounded plaintexts");
    let tag_start = sealed.len() - TAG_SIZE;
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&sealed[tag_start..]);
    sealed.truncate(tag_start);
    (sealed, tag)
}

fn open(
    key: &[u8; 32],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
    on_failure: MeshError,
) -> Result<Vec<u8>> {
    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), sealed.as_ref())
        .map_err(|_| on_failure)
}

/// Sign and encrypt `message` into a wire packet. The caller supplies a
/// header whose `public_key` and `signature` fields are still placeholder
/// (they are overwritten here using `signer`).
pub fn encode(
    network_key: &[u8; 32],
    mut header: EnvelopeHeader,
    message: &MeshMessage,
    signer: &IdentityKeypair,
) -> Result<Vec<u8>> {
    header.network_hash = network_hash(network_key);
    header.public_key = signer.public_key_bytes();
    header.signature = [0u8; 64];
    let signing_bytes = header.signing_bytes();
    header.signature = signer.sign(&signing_bytes).to_bytes();

    let header_plaintext = header.encode();
    let payload_plaintext = serde_json::to_vec(message)?;

    let header_nonce: [u8; NONCE_SIZE] = rand::random();
    let payload_nonce = self::payload_nonce(&header_nonce);

    let (header_ciphertext, header_tag) =
        seal(&header_key(network_key), &header_nonce, &header_plaintext);
    let (payload_ciphertext, payload_tag) = seal(network_key, &payload_nonce, &payload_plaintext);

    let mut packet = Vec::with_capacity(
        PACKET_PREFIX.len()
            + NONCE_SIZE
            + TAG_SIZE
            + 2
            + header_ciphertext.len()
            + 4
            + payload_ciphertext.len()
            + TAG_SIZE,
    );
    packet.extend_from_slice(&PACKET_PREFIX);
    packet.extend_from_slice(&header_nonce);
    packet.extend_from_slice(&header_tag);
    packet.extend_from_slice(&(header_ciphertext.len() as u16).to_be_bytes());
    packet.extend_from_slice(&header_ciphertext);
    packet.extend_from_slice(&(payload_ciphertext.len() as u32).to_be_bytes());
    packet.extend_from_slice(&payload_ciphertext);
    packet.extend_from_slice(&payload_tag);

    Ok(packet)
}

/// Decode and authenticate a wire packet against `network_key`, returning
/// the parsed header and message. `replay_guard` admits messages whose
/// timestamp is outside the replay window but whose message id is novel.
pub fn decode(
    packet: &[u8],
    network_key: &[u8; 32],
    replay_guard: &ReplayGuard,
) -> Result<(EnvelopeHeader, MeshMessage)> {
    if packet.len() < MIN_PACKET_LEN {
        return Err(MeshError::TruncatedPacket);
    }
    if packet[..PACKET_PREFIX.len()] != PACKET_PREFIX {
        return Err(MeshError::InvalidPrefix);
    }

    let mut offset = PACKET_PREFIX.len();
    let mut header_nonce = [0u8; NONCE_SIZE];
    header_nonce.copy_from_slice(&packet[offset..offset + NONCE_SIZE]);
    offset += NONCE_SIZE;

    let mut header_tag = [0u8; TAG_SIZE];
    header_tag.copy_from_slice(&packet[offset..offset + TAG_SIZE]);
    offset += TAG_SIZE;

    if packet.len() < offset + 2 {
        return Err(MeshError::TruncatedPacket);
    }
    let header_len = u16::from_be_bytes([packet[offset], packet[offset + 1]]) as usize;
    offset += 2;

    if packet.len() < offset + header_len {
        return Err(MeshError::TruncatedPacket);
    }
    let header_ciphertext = &packet[offset..offset + header_len];
    offset += header_len;

    let header_plaintext = open(
        &header_key(network_key),
        &header_nonce,
        header_ciphertext,
        &header_tag,
        MeshError::HeaderAuthenticationFailed,
    )?;
    let header = EnvelopeHeader::decode(&header_plaintext)?;

    if header.network_hash != network_hash(network_key) {
        return Err(MeshError::NetworkMismatch);
    }

    if packet.len() < offset + 4 {
        return Err(MeshError::TruncatedPacket);
    }
    let payload_len = u32::from_be_bytes([
        packet[offset],
        packet[offset + 1],
        packet[offset + 2],
        packet[offset + 3],
    ]) as usize;
    offset += 4;

    if packet.len() < offset + payload_len + TAG_SIZE {
        return Err(MeshError::TruncatedPacket);
    }
    let payload_ciphertext = &packet[offset..offset + payload_len];
    offset += payload_len;
    let mut payload_tag = [0u8; TAG_SIZE];
    payload_tag.copy_from_slice(&packet[offset..offset + TAG_SIZE]);

    let payload_plaintext = open(
        network_key,
        &self::payload_nonce(&header_nonce),
        payload_ciphertext,
        &payload_tag,
        MeshError::PayloadAuthenticationFailed,
    )?;
    let message: MeshMessage = serde_json::from_slice(&payload_plaintext)?;

    signer_matches(&header)?;
    check_replay(&header, replay_guard)?;

    Ok((header, message))
}

fn signer_matches(header: &EnvelopeHeader) -> Result<()> {
    use ed25519_dalek::Verifier;
    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&header.public_key)
        .map_err(|_| MeshError::InvalidPublicKeySize)?;
    let signature = ed25519_dalek::Signature::from_bytes(&header.signature);
    verifying_key
        .verify(&header.signing_bytes(), &signature)
        .map_err(|_| MeshError::SignatureInvalid)?;

    let derived = PeerId::derive(&header.public_key)?;
    if derived != header.sender_peer_id {
        return Err(MeshError::PeerIdDerivationMismatch);
    }
    Ok(())
}

fn check_replay(header: &EnvelopeHeader, replay_guard: &ReplayGuard) -> Result<()> {
    use crate::constants::{REPLAY_WINDOW_FUTURE, REPLAY_WINDOW_PAST};
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i128;
    let ts = header.timestamp_ms as i128;
    let past_ms = REPLAY_WINDOW_PAST.as_millis() as i128;
    let future_ms = REPLAY_WINDOW_FUTURE.as_millis() as i128;

    let within_window = ts >= now_ms - past_ms && ts <= now_ms + future_ms;
    if within_window {
        return Ok(());
    }
    if replay_guard.check_and_record(header.message_id) {
        Ok(())
    } else {
        Err(MeshError::ReplaySuspect)
    }
}
