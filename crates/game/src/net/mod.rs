mod ack;
mod behavior;
mod bitstream;
mod dispatch;
mod framing;
pub mod packets;
mod protocol;
mod quantize;
pub mod requests;
mod stats;
pub mod trace;

pub use ack::{ACK_BODY_LEN, ACKED_OPCODES, SequencedHeader, build_ack, requires_ack};
pub use behavior::{BehaviorConfig, BehaviorHeader, Handling, UnitDefaults, VehiclePhysics};
pub use bitstream::{BitReader, BitWriter, BitstreamError, MAX_STRING_LEN, ReadMode};
pub use dispatch::{Dispatch, Handler, PacketRegistry, RegistryBuilder, TransportKind};
pub use framing::{TCP_HEADER_LEN, encode_tcp_frame, split_datagram, strip_udp_length, tcp_body_len};
pub use protocol::{
    DEFAULT_TCP_PORT, DEFAULT_TICK_RATE, DEFAULT_UDP_PORT, HelloSubCommand,
    MAX_DATAGRAM_SIZE, MAX_ENTITIES_PER_UPDATE, PacketError, ServerClock, expect_len,
    login_status, opcode, reincarnate,
};
pub use quantize::{
    FIRST_VECTOR_SLOT, FixedPriority, MaxPrecision, PrecisionPolicy, QuantizationProfile,
    Quantized, SLOT_BANK_SELECTOR, SLOT_CARGO_TYPE, SLOT_ENERGY, SLOT_HEALTH, SLOT_TEAM,
    SLOT_UNIT_TYPE, SLOT_WEAPON, TRANSLATION_SLOTS, TranslationTable, VECTOR_BANKS, VectorField,
};
pub use stats::{NetworkStats, rand_u64};
