pub mod article;
pub mod comment;
pub mod user;

pub use article::{Article, ArticleEntry, ArticleTag, NewArticle, Tag};
pub use comment::{Comment, CommentEntry, NewComment};
pub use user::{NewUser, User};
