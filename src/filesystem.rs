use crate::orm::posts::MediaType;
use crate::s3::S3Bucket;
use actix_multipart::Field;
use actix_web::{error, Error};
use futures::StreamExt;
use once_cell::sync::OnceCell;
use rusoto_core::Region;

static S3BUCKET: OnceCell<S3Bucket> = OnceCell::new();

pub fn init() {
    let bucket_name =
        std::env::var("S3_BUCKET_NAME").expect("S3_BUCKET_NAME MISSING from .env");
    let region_name =
        std::env::var("S3_REGION_NAME").expect("S3_REGION_NAME MISSING from .env");
    let endpoint = std::env::var("S3_ENDPOINT").expect("S3_ENDPOINT MISSING from .env");
    let pub_url = std::env::var("S3_PUB_URL").expect("S3_PUB_URL MISSING from .env");

    S3BUCKET
        .set(S3Bucket::new(
            Region::Custom {
                name: region_name,
                endpoint,
            },
            bucket_name,
            pub_url,
        ))
        .unwrap_or_else(|_| panic!("failed to set S3BUCKET"));
}

#[inline(always)]
pub fn get_s3() -> &'static S3Bucket {
    unsafe { S3BUCKET.get_unchecked() }
}

/// One buffered multipart file, hashed while it streamed in.
pub struct UploadPayload {
    pub data: Vec<u8>,
    pub filename: String,
    pub mime: mime::Mime,
    pub hash: blake3::Hash,
}

/// Address of a relayed file on the media host.
pub struct StoredFile {
    pub url: String,
    pub hash: String,
}

/// Buffers a multipart field, hashing as chunks arrive. Returns None for an
/// empty field so callers can treat "no file picked" as absence.
pub async fn read_upload_field(field: &mut Field) -> Result<Option<UploadPayload>, Error> {
    let filename = field
        .content_disposition()
        .get_filename()
        .unwrap_or("upload")
        .to_owned();
    let mime = field.content_type().to_owned();

    let mut hasher = blake3::Hasher::new();
    let mut buf: Vec<u8> = Vec::with_capacity(1024);
    while let Some(chunk) = field.next().await {
        let bytes = chunk.map_err(|e| {
            log::error!("read_upload_field: multipart read error: {}", e);
            error::ErrorInternalServerError("error reading upload data")
        })?;
        hasher.update(&bytes);
        buf.extend(bytes);
    }

    if buf.is_empty() {
        return Ok(None);
    }

    Ok(Some(UploadPayload {
        data: buf,
        filename,
        mime,
        hash: hasher.finalize(),
    }))
}

/// Relays an upload to object storage and returns its public URL.
/// Content-addressed: an already-stored hash skips the put.
pub async fn relay_to_storage(payload: UploadPayload) -> Result<StoredFile, Error> {
    let s3 = get_s3();
    let hash = payload.hash.to_string();
    let key = S3Bucket::key_for(&hash, extension(&payload.filename));

    let list = s3.list_objects_v2(&key).await.map_err(|e| {
        log::error!("relay_to_storage: failed to list_objects_v2: {}", e);
        error::ErrorInternalServerError("failed to check if file exists")
    })?;

    if list.key_count.unwrap_or(0) == 0 {
        s3.put_object(payload.data, &key, payload.mime.as_ref())
            .await
            .map_err(|e| {
                log::error!("relay_to_storage: failed to put_object: {}", e);
                error::ErrorInternalServerError("failed to store file")
            })?;
    } else {
        log::info!("relay_to_storage: duplicate upload, skipping S3 put_object");
    }

    Ok(StoredFile {
        url: s3.get_public_url(&key),
        hash,
    })
}

/// Anything video/* is a video; everything else is treated as an image.
pub fn media_type_for_mime(mime: &mime::Mime) -> MediaType {
    if mime.type_() == mime::VIDEO {
        MediaType::Video
    } else {
        MediaType::Image
    }
}

fn extension(filename: &str) -> Option<&str> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| !ext.is_empty() && ext.len() <= 5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_mimes_classify_as_video() {
        let webm: mime::Mime = "video/webm".parse().unwrap();
        let png: mime::Mime = "image/png".parse().unwrap();
        let octet: mime::Mime = "application/octet-stream".parse().unwrap();
        assert_eq!(media_type_for_mime(&webm), MediaType::Video);
        assert_eq!(media_type_for_mime(&png), MediaType::Image);
        assert_eq!(media_type_for_mime(&octet), MediaType::Image);
    }

    #[test]
    fn extensions_come_from_the_last_dot() {
        assert_eq!(extension("selfie.final.jpg"), Some("jpg"));
        assert_eq!(extension("upload"), None);
        assert_eq!(extension("trailing."), None);
        assert_eq!(extension("weird.verylongext"), None);
    }
}
