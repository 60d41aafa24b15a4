//! hpcview Wire - Change Packet Codec
//!
//! Little-endian binary layout for the notification channel: typed property
//! entries, object events, rowset changes, the Hello handshake, keep-alives
//! and legacy tunnels.

pub mod codec;
pub mod datetime;
pub mod decoder;
pub mod encoder;
pub mod packet;
pub mod reader;
pub mod writer;

pub use codec::{codec_for, decode_property, encode_property, ValueCodec};
pub use decoder::PacketDecoder;
pub use encoder::{encode_packet, EncodeCache, PacketEncoder};
pub use packet::{EntityKind, Hello, ObjectEvent, Packet, PacketType, RowsetChange};
pub use reader::WireReader;
pub use writer::WireWriter;
