mod article;
mod user;

pub use article::ArticleStore;
pub use user::UserStore;
