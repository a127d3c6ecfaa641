use encoding::{DecoderTrap, EncoderTrap};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Character set of the server console.
///
/// Windows hosts frequently run the server with a GBK console, so input and
/// output are transcoded instead of assuming UTF-8.
#[allow(clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    ASCII,
    #[default]
    UTF8,
    UTF16LE,
    UTF16BE,
    GBK,
    GB18030,
    BIG5_2003,
}

fn map_encoding(encoding: &Encoding) -> encoding::EncodingRef {
    match encoding {
        Encoding::ASCII => encoding::all::ASCII,
        Encoding::UTF8 => encoding::all::UTF_8,
        Encoding::UTF16LE => encoding::all::UTF_16LE,
        Encoding::UTF16BE => encoding::all::UTF_16BE,
        Encoding::GBK => encoding::all::GBK,
        Encoding::GB18030 => encoding::all::GB18030,
        Encoding::BIG5_2003 => encoding::all::BIG5_2003,
    }
}

static STR2ENCODING_MAP: LazyLock<HashMap<&'static str, Encoding>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    map.insert("ascii", Encoding::ASCII);
    map.insert("utf-8", Encoding::UTF8);
    map.insert("utf-16le", Encoding::UTF16LE);
    map.insert("utf-16be", Encoding::UTF16BE);
    map.insert("gbk", Encoding::GBK);
    map.insert("gb18030", Encoding::GB18030);
    map.insert("big5-2003", Encoding::BIG5_2003);
    map
});

impl Encoding {
    pub fn get(&self) -> encoding::EncodingRef {
        map_encoding(self)
    }

    pub fn from_name(name: &str) -> Option<Encoding> {
        STR2ENCODING_MAP
            .get(name.trim().to_ascii_lowercase().as_str())
            .copied()
    }

    /// Undecodable bytes become U+FFFD instead of failing the whole line.
    pub fn decode_lossy(&self, bytes: &[u8]) -> String {
        if *self == Encoding::UTF8 {
            return String::from_utf8_lossy(bytes).into_owned();
        }
        self.get()
            .decode(bytes, DecoderTrap::Replace)
            .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn encode_lossy(&self, text: &str) -> Vec<u8> {
        if *self == Encoding::UTF8 {
            return text.as_bytes().to_vec();
        }
        self.get()
            .encode(text, EncoderTrap::Replace)
            .unwrap_or_else(|_| text.as_bytes().to_vec())
    }
}

impl Serialize for Encoding {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.get().name())
    }
}

impl<'de> Deserialize<'de> for Encoding {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoding_name = String::deserialize(deserializer)?;
        Encoding::from_name(&encoding_name)
            .ok_or_else(|| serde::de::Error::custom(format!("Unknown encoding: {}", encoding_name)))
    }
}
