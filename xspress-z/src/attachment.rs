use zenoh::bytes::ZBytes;
use zenoh_ext::{ZDeserializer, ZSerializer};

use crate::endpoint::ClientIdentity;

/// Per-frame metadata carried next to the payload on the zenoh link.
///
/// The control server uses `identity` the way a ROUTER socket uses the
/// peer identity frame: to address the reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub sequence_number: i64,
    pub identity: String,
}

impl Attachment {
    pub fn new(sequence_number: i64, identity: &ClientIdentity) -> Self {
        Self {
            sequence_number,
            identity: identity.as_str().to_owned(),
        }
    }
}

impl TryFrom<&ZBytes> for Attachment {
    type Error = zenoh::Error;
    fn try_from(value: &ZBytes) -> Result<Self, Self::Error> {
        let mut des = ZDeserializer::new(value);
        let sequence_number = des.deserialize::<i64>()?;
        let identity = des.deserialize::<String>()?;
        Ok(Attachment {
            sequence_number,
            identity,
        })
    }
}

impl From<Attachment> for ZBytes {
    fn from(value: Attachment) -> Self {
        let mut ser = ZSerializer::new();
        ser.serialize(value.sequence_number);
        ser.serialize(&value.identity);
        ser.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_through_zbytes() {
        let identity = ClientIdentity::from("00ff-beef".to_string());
        let att = Attachment::new(42, &identity);
        let bytes = ZBytes::from(att.clone());
        let back = Attachment::try_from(&bytes).unwrap();
        assert_eq!(back, att);
        assert_eq!(back.identity, "00ff-beef");
    }
}
