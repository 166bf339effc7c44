use crate::application::error::DataSourceError;

pub fn map_sqlx_error(sitemap: &str, err: sqlx::Error) -> DataSourceError {
    match err {
        sqlx::Error::PoolTimedOut => DataSourceError::Timeout,
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to statement timeout")
                || db
                    .message()
                    .contains("canceling statement due to user request") =>
        {
            DataSourceError::Timeout
        }
        // Missing table, column or operator: the descriptor does not match the schema.
        sqlx::Error::Database(db) if db.message().contains("does not exist") => {
            DataSourceError::unsupported(sitemap, db.message())
        }
        other => DataSourceError::query(sitemap, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error("posts", sqlx::Error::PoolTimedOut),
            DataSourceError::Timeout
        ));
    }

    #[test]
    fn other_errors_keep_the_sitemap_name() {
        let err = map_sqlx_error("posts", sqlx::Error::RowNotFound);
        assert!(matches!(err, DataSourceError::Query { ref sitemap, .. } if sitemap == "posts"));
    }
}
