pub(crate) mod rejection_body;
