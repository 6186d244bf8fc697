use rusoto_core::Region;
use rusoto_core::RusotoError;
use rusoto_s3::{
    ListObjectsV2Error, ListObjectsV2Output, ListObjectsV2Request, PutObjectError, PutObjectOutput,
    PutObjectRequest, S3Client, S3,
};

pub struct S3Bucket {
    s3: S3Client,
    bucket_name: String,
    pub pub_url: String,
}

impl S3Bucket {
    pub fn new(region: Region, bucket_name: String, pub_url: String) -> S3Bucket {
        log::info!("Initializing new S3 Bucket.");

        S3Bucket {
            s3: S3Client::new(region),
            bucket_name,
            pub_url,
        }
    }

    /// Content-addressed object key, sharded by the first hash bytes so no
    /// single prefix accumulates every upload.
    pub fn key_for(hash: &str, extension: Option<&str>) -> String {
        // hashes are 64 hex chars; anything shorter is a caller bug
        let prefix1 = &hash[0..2];
        let prefix2 = &hash[2..4];
        match extension {
            Some(ext) => format!("{}/{}/{}.{}", prefix1, prefix2, hash, ext),
            None => format!("{}/{}/{}", prefix1, prefix2, hash),
        }
    }

    pub fn get_public_url(&self, key: &str) -> String {
        format!("{}/{}", self.pub_url, key)
    }

    pub async fn list_objects_v2(
        &self,
        key: &str,
    ) -> Result<ListObjectsV2Output, RusotoError<ListObjectsV2Error>> {
        log::info!("S3Bucket: list_objects_v2: {}", key);

        // dude claims list_objects_v2 is faster than head_object
        // https://www.peterbe.com/plog/fastest-way-to-find-out-if-a-file-exists-in-s3
        let list_request = ListObjectsV2Request {
            bucket: self.bucket_name.to_owned(),
            prefix: Some(key.to_owned()),
            ..Default::default()
        };

        self.s3.list_objects_v2(list_request).await
    }

    pub async fn put_object(
        &self,
        data: Vec<u8>,
        key: &str,
        content_type: &str,
    ) -> Result<PutObjectOutput, RusotoError<PutObjectError>> {
        log::info!("S3Bucket: put_object: {}", key);

        let put_request = PutObjectRequest {
            bucket: self.bucket_name.to_owned(),
            key: key.to_owned(),
            body: Some(data.into()),
            content_type: Some(content_type.to_owned()),
            ..Default::default()
        };

        self.s3.put_object(put_request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_shard_on_leading_hash_bytes() {
        let hash = "deadbeef00";
        assert_eq!(S3Bucket::key_for(hash, None), "de/ad/deadbeef00");
        assert_eq!(S3Bucket::key_for(hash, Some("png")), "de/ad/deadbeef00.png");
    }
}
