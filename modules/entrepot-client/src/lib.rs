pub mod auth;
pub mod requester;
pub mod store;

pub use auth::Authenticator;
pub use requester::{ApiRequester, ApiResponse, FileUpload, ParamValue, Params, RequestOptions, Timeout};
pub use store::{
    Annexe, CommentInterface, Configuration, Datastore, Entity, FullEditInterface, Offering,
    ProcessingExecution, ReUploadFileInterface, SharingInterface, StoreEntity, StoredData,
    TagInterface, Upload,
};
