use anyhow::{anyhow, Result};
use image::DynamicImage;
use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

pub fn face_hasher(hash_size: u32) -> Hasher {
    HasherConfig::new()
        .hash_alg(HashAlg::DoubleGradient)
        .hash_size(hash_size, hash_size)
        .to_hasher()
}

pub fn compute_phash(hasher: &Hasher, face: &DynamicImage) -> ImageHash {
    hasher.hash_image(face)
}

pub fn decode_phash(encoded: &str) -> Result<ImageHash> {
    ImageHash::<Box<[u8]>>::from_base64(encoded)
        .map_err(|_| anyhow!("invalid perceptual hash '{encoded}'"))
}

pub fn hash_bits(hash: &ImageHash) -> u32 {
    (hash.as_bytes().len() * 8) as u32
}

/// Hamming distance as a percentage of the hash length: 0 for identical
/// faces, 100 when every bit differs.
pub fn distance_percent(lhs: &ImageHash, rhs: &ImageHash) -> f64 {
    let bits = hash_bits(lhs).max(1);
    f64::from(lhs.dist(rhs)) * 100.0 / f64::from(bits)
}
