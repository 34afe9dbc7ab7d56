//! Domain layer: strong types with validation and invariants (no I/O).

mod params;
mod request;
mod response;
mod types;
mod update;
mod validation;
mod value;

pub use params::{Encoding, InputFile, ParamValue, Params};
pub use request::{
    GET_UPDATES_MAX_LIMIT, GetUpdates, PollingOptions, WEBHOOK_MAX_CONNECTIONS, WebhookConfig,
};
pub use response::{File, ResponseParameters, WebhookInfo};
pub use types::{
    CallbackQuery, Chat, ChatJoinRequest, ChatMember, ChatMemberUpdated, ChosenInlineResult,
    InlineQuery, Message, MessageEntity, Poll, PollAnswer, PollOption, User,
};
pub use update::{Update, UpdateKind, UpdateType};
pub use validation::ValidationError;
pub use value::{BotToken, ErrorCode, KnownErrorCode};
