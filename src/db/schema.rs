diesel::table! {
    users (id) {
        id -> Int4,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        username -> Varchar,
        email -> Varchar,
        password -> Varchar,
        bio -> Text,
        image -> Text,
    }
}

diesel::table! {
    articles (id) {
        id -> Int4,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        deleted_at -> Nullable<Timestamp>,
        title -> Varchar,
        description -> Varchar,
        body -> Text,
        user_id -> Int4,
        favorites_count -> Int4,
    }
}

diesel::table! {
    tags (id) {
        id -> Int4,
        name -> Varchar,
    }
}

diesel::table! {
    comments (id) {
        id -> Int4,
        created_at -> Timestamp,
        updated_at -> Timestamp,
        body -> Text,
        user_id -> Int4,
        article_id -> Int4,
    }
}

diesel::table! {
    article_tags (article_id, tag_id) {
        article_id -> Int4,
        tag_id -> Int4,
    }
}

diesel::table! {
    favorite_articles (article_id, user_id) {
        article_id -> Int4,
        user_id -> Int4,
    }
}

diesel::table! {
    follows (from_user_id, to_user_id) {
        from_user_id -> Int4,
        to_user_id -> Int4,
    }
}

diesel::joinable!(articles -> users (user_id));
diesel::joinable!(comments -> users (user_id));
diesel::joinable!(comments -> articles (article_id));
diesel::joinable!(article_tags -> articles (article_id));
diesel::joinable!(article_tags -> tags (tag_id));
diesel::joinable!(favorite_articles -> articles (article_id));
diesel::joinable!(favorite_articles -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    articles,
    tags,
    comments,
    article_tags,
    favorite_articles,
    follows,
);
