pub mod net;
pub mod session;
pub mod world;

pub use net::{
    BitReader, BitWriter, BitstreamError, DEFAULT_TCP_PORT, DEFAULT_TICK_RATE, DEFAULT_UDP_PORT,
    Dispatch, Handler, MaxPrecision, NetworkStats, PacketError, PacketRegistry, PrecisionPolicy,
    QuantizationProfile, ReadMode, ServerClock, TranslationTable, TransportKind,
};
pub use session::{
    BindError, BindingState, ClaimOutcome, Identity, PLAYER_ID_BASE, PhaseError, RegistryError,
    Route, SessionId, SessionKey, SessionPhase, SessionRecord, SessionRegistry, SimState,
    TransportBinding, UdpEndpointContext,
};
pub use world::{
    DirtyMask, Entity, EntityManager, EntityRemoved, LocalStats, UpdateArrayEncoder,
    UpdateArrayError, UpdateEntry, UpdateKind, WorldError,
};
