#![allow(dead_code)]

use exemplar_core::{
    open_db_in_memory, AccessError, AttrValue, Entity, EntityRow, EntitySchema, Mapped,
    RowDecodeError, SchemaRegistry,
};
use rusqlite::Connection;

pub const SCHEMA_SQL: &str = "
CREATE TABLE city (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL
);
CREATE TABLE person (
    id INTEGER PRIMARY KEY,
    nickname TEXT,
    name TEXT NOT NULL,
    email TEXT UNIQUE,
    age INTEGER,
    active INTEGER,
    address_street TEXT,
    address_city_id INTEGER REFERENCES city(id),
    city_id INTEGER REFERENCES city(id)
);";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub resident_ids: Vec<i64>,
}

impl City {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

impl Mapped for City {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError> {
        match attribute {
            "id" => Ok(self.id.into()),
            "name" => Ok((&self.name).into()),
            "residents" => Ok(AttrValue::Collection(self.resident_ids.len())),
            _ => Err(AccessError::Missing),
        }
    }
}

impl Entity for City {
    const NAME: &'static str = "City";

    fn from_row(row: &EntityRow<'_, '_>) -> Result<Self, RowDecodeError> {
        Ok(Self {
            id: row.integer("id")?,
            name: row.text("name")?,
            resident_ids: Vec::new(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<City>,
}

impl Mapped for Address {
    fn type_name(&self) -> &'static str {
        "Address"
    }

    fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError> {
        match attribute {
            "street" => Ok((&self.street).into()),
            "city" => Ok(self
                .city
                .as_ref()
                .map_or(AttrValue::Null, |city| AttrValue::Entity(city))),
            _ => Err(AccessError::Missing),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Person {
    pub id: i64,
    pub nickname: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub age: Option<i64>,
    pub active: Option<bool>,
    pub address: Option<Address>,
    pub city: Option<City>,
}

impl Person {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_age(mut self, age: i64) -> Self {
        self.age = Some(age);
        self
    }
}

impl Mapped for Person {
    fn type_name(&self) -> &'static str {
        Self::NAME
    }

    fn read(&self, attribute: &str) -> Result<AttrValue<'_>, AccessError> {
        match attribute {
            "id" => Ok(self.id.into()),
            "nickname" => Ok((&self.nickname).into()),
            "name" => Ok((&self.name).into()),
            "email" => Ok((&self.email).into()),
            "age" => Ok(self.age.into()),
            "active" => Ok(self.active.into()),
            "address" => Ok(self
                .address
                .as_ref()
                .map_or(AttrValue::Null, |address| AttrValue::Embedded(address))),
            "city" => Ok(self
                .city
                .as_ref()
                .map_or(AttrValue::Null, |city| AttrValue::Entity(city))),
            _ => Err(AccessError::Missing),
        }
    }
}

impl Entity for Person {
    const NAME: &'static str = "Person";

    fn from_row(row: &EntityRow<'_, '_>) -> Result<Self, RowDecodeError> {
        let street = row.opt_text("address.street")?;
        let address_city = row.opt_integer("address.city")?;
        let address = (street.is_some() || address_city.is_some()).then(|| Address {
            street,
            city: address_city.map(City::with_id),
        });
        Ok(Self {
            id: row.integer("id")?,
            nickname: row.opt_text("nickname")?,
            name: row.text("name")?,
            email: row.opt_text("email")?,
            age: row.opt_integer("age")?,
            active: row.opt_bool("active")?,
            address,
            city: row.opt_integer("city")?.map(City::with_id),
        })
    }
}

pub fn registry() -> SchemaRegistry {
    SchemaRegistry::builder()
        .register(
            EntitySchema::abstract_base("Party")
                .identity("id", "id")
                .regular("nickname", "nickname"),
        )
        .register(
            EntitySchema::embeddable("Address")
                .regular("street", "street")
                .to_one("city", "city_id", "City"),
        )
        .register(
            EntitySchema::entity("City", "city")
                .identity("id", "id")
                .regular("name", "name")
                .to_many("residents", "Person", "city_id"),
        )
        .register(
            EntitySchema::entity("Person", "person")
                .extends("Party")
                .regular("name", "name")
                .regular("email", "email")
                .regular("age", "age")
                .regular("active", "active")
                .embedded("address", "address", "Address")
                .to_one("city", "city_id", "City"),
        )
        .build()
        .unwrap()
}

pub fn setup_db() -> Connection {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(SCHEMA_SQL).unwrap();
    conn
}

pub fn row_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}
