mod backoff;
mod client;
mod pacer;

pub use client::{
    Collection, IdRef, PAGE_SIZE, PageQuery, Raindrop, RaindropClient, RaindropError,
    RaindropPage, SORT_BY_ORDER,
};
